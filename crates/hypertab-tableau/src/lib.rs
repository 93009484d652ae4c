//! ハイパーテーブルロー充足可能性カーネル
//!
//! このクレートは DL 節集合に対する決定手続きを提供します:
//! - ノードグラフ (ラベル、エッジ、不等式、マージ、アンドゥログ)
//! - ブロッキング (直接ブロッキング判定、シグネチャキャッシュ、戦略)
//! - ハイパーレゾリューションによる規則適用と存在量化の展開
//! - 選言と時系列バックトラッキング探索
//! - 読み取り専用の検査ビュー

pub mod config;
pub mod graph;
pub mod blocking;
pub mod disjunction;
pub mod rules;
pub mod expansion;
pub mod search;
pub mod tableau;
pub mod inspect;

pub use config::{BlockingCheckerKind, BlockingConfig, BlockingStrategyKind, CancellationToken, ExpansionOrder, TableauConfig};
pub use graph::{BlockingState, Graph, GraphSnapshot, NodeId, NodeStatus};
pub use disjunction::{DisjunctionId, GroundDisjunct};
pub use inspect::{ActiveNodesReport, DisjunctionView, NodeView, UnprocessedDisjunctionsReport};
pub use tableau::{Tableau, TableauStatistics};

use hypertab_model::ModelError;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableauError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] ModelError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Resource exhausted: {resource} exceeded limit {limit}")]
    ResourceExhausted { resource: String, limit: u64 },

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Satisfiability check cancelled")]
    Cancelled,
}

/// Why the current branch is inconsistent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClashReason {
    /// ⊥ derived for a node
    Nothing(NodeId),
    /// A and ¬A in one label
    Complementary { node: NodeId, concept: String },
    /// x ≠ x
    UnequalToItself(NodeId),
    /// Merge of two nodes recorded unequal
    MergeOfUnequal { left: NodeId, right: NodeId },
    /// A clause with an empty head fired
    EmptyHead(String),
    /// Every disjunct of a ground disjunction is refuted
    RefutedDisjunction(String),
}

/// Local inconsistency signal consumed by the backtracking search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clash {
    pub reason: ClashReason,
}

impl Clash {
    pub fn new(reason: ClashReason) -> Self {
        Self { reason }
    }
}

impl From<ClashReason> for Clash {
    fn from(reason: ClashReason) -> Self {
        Self::new(reason)
    }
}

impl fmt::Display for Clash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ClashReason::Nothing(node) => write!(f, "Nothing derived for node {}", node),
            ClashReason::Complementary { node, concept } => {
                write!(f, "{} and its complement in the label of node {}", concept, node)
            }
            ClashReason::UnequalToItself(node) => write!(f, "node {} unequal to itself", node),
            ClashReason::MergeOfUnequal { left, right } => {
                write!(f, "merge of unequal nodes {} and {}", left, right)
            }
            ClashReason::EmptyHead(clause) => write!(f, "clause {} fired", clause),
            ClashReason::RefutedDisjunction(disjunction) => write!(f, "every disjunct of {} is refuted", disjunction),
        }
    }
}
