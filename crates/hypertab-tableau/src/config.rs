//! テーブルロー設定

use crate::TableauError;
use hypertab_model::KnowledgeBaseFlags;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which nodes are eligible to block a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategyKind {
    /// Decide from the knowledge base flags
    #[default]
    Auto,
    /// Only strict tree ancestors may block
    Ancestor,
    /// Any earlier-created node may block
    Anywhere,
}

/// How much structure the direct blocking check compares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingCheckerKind {
    #[default]
    Auto,
    /// L(x) ⊆ L(y); only valid when no clause derives facts for a
    /// predecessor from its successor, so never chosen by `Auto`
    SingleSubset,
    /// L(x) = L(y)
    SingleEquality,
    /// Equal labels of node and parent plus equal connecting edges
    Pairwise,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingConfig {
    #[serde(default)]
    pub strategy: BlockingStrategyKind,
    #[serde(default)]
    pub checker: BlockingCheckerKind,
}

/// Order in which nodes have their existentials expanded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionOrder {
    /// Breadth-first: oldest node first
    #[default]
    CreationOrder,
    /// Depth-first: newest node first
    NewestFirst,
}

/// テーブルロー設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableauConfig {
    pub blocking: BlockingConfig,
    pub expansion: ExpansionOrder,
    /// 既に反駁された選言肢の否定を後続の分岐で主張する
    pub semantic_branching: bool,
    /// 生存ノード数の上限
    pub max_nodes: usize,
    /// ループ反復回数の上限
    pub max_steps: Option<u64>,
    /// タイムアウト（ミリ秒）
    pub timeout_ms: Option<u64>,
}

impl Default for TableauConfig {
    fn default() -> Self {
        Self {
            blocking: BlockingConfig::default(),
            expansion: ExpansionOrder::default(),
            semantic_branching: true,
            max_nodes: 100_000,
            max_steps: None,
            timeout_ms: None,
        }
    }
}

impl TableauConfig {
    pub fn from_json(input: &str) -> Result<Self, TableauError> {
        serde_json::from_str(input).map_err(|e| TableauError::InvalidConfiguration(e.to_string()))
    }

    /// Replace `Auto` with concrete blocking variants for a knowledge base
    pub fn resolve_blocking(
        &self,
        flags: &KnowledgeBaseFlags,
    ) -> Result<(BlockingStrategyKind, BlockingCheckerKind), TableauError> {
        let needs_pairwise = flags.has_inverse_roles || flags.has_at_most_restrictions;
        let anywhere_is_sound = !needs_pairwise && !flags.has_nominals;

        let strategy = match (self.blocking.strategy, self.blocking.checker) {
            (BlockingStrategyKind::Auto, BlockingCheckerKind::SingleSubset) => BlockingStrategyKind::Ancestor,
            (BlockingStrategyKind::Auto, _) if anywhere_is_sound => BlockingStrategyKind::Anywhere,
            (BlockingStrategyKind::Auto, _) => BlockingStrategyKind::Ancestor,
            (explicit, _) => explicit,
        };

        let checker = match self.blocking.checker {
            BlockingCheckerKind::Auto if needs_pairwise => BlockingCheckerKind::Pairwise,
            BlockingCheckerKind::Auto => BlockingCheckerKind::SingleEquality,
            explicit => explicit,
        };

        if strategy == BlockingStrategyKind::Anywhere && checker == BlockingCheckerKind::SingleSubset {
            return Err(TableauError::InvalidConfiguration(
                "anywhere blocking needs an equality-based checker; single_subset only works with ancestor blocking"
                    .to_string(),
            ));
        }
        if self.max_nodes == 0 {
            return Err(TableauError::InvalidConfiguration("max_nodes must be positive".to_string()));
        }

        Ok((strategy, checker))
    }
}

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(inverse: bool, at_most: bool, nominals: bool) -> KnowledgeBaseFlags {
        KnowledgeBaseFlags {
            has_inverse_roles: inverse,
            has_at_most_restrictions: at_most,
            has_nominals: nominals,
        }
    }

    #[test]
    fn test_auto_picks_anywhere_for_plain_knowledge_base() {
        let resolved = TableauConfig::default().resolve_blocking(&flags(false, false, false)).unwrap();
        assert_eq!(resolved, (BlockingStrategyKind::Anywhere, BlockingCheckerKind::SingleEquality));
    }

    #[test]
    fn test_auto_picks_pairwise_ancestor_with_inverse_roles() {
        let resolved = TableauConfig::default().resolve_blocking(&flags(true, false, false)).unwrap();
        assert_eq!(resolved, (BlockingStrategyKind::Ancestor, BlockingCheckerKind::Pairwise));
    }

    #[test]
    fn test_nominals_force_ancestor_blocking() {
        let resolved = TableauConfig::default().resolve_blocking(&flags(false, false, true)).unwrap();
        assert_eq!(resolved, (BlockingStrategyKind::Ancestor, BlockingCheckerKind::SingleEquality));
    }

    #[test]
    fn test_anywhere_with_subset_is_rejected() {
        let mut config = TableauConfig::default();
        config.blocking = BlockingConfig {
            strategy: BlockingStrategyKind::Anywhere,
            checker: BlockingCheckerKind::SingleSubset,
        };
        assert!(matches!(
            config.resolve_blocking(&flags(false, false, false)),
            Err(TableauError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = TableauConfig::from_json(r#"{"expansion": "newest_first", "max_steps": 500}"#).unwrap();
        assert_eq!(config.expansion, ExpansionOrder::NewestFirst);
        assert_eq!(config.max_steps, Some(500));
        assert!(config.semantic_branching);
        assert_eq!(config.max_nodes, 100_000);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
