//! ブロッキング戦略

use super::checker::DirectBlockingChecker;
use super::signature::SignatureCache;
use crate::config::BlockingStrategyKind;
use crate::graph::{Graph, NodeId};

/// Eligibility rule for blockers
pub trait BlockingStrategy: Send + Sync {
    fn kind(&self) -> BlockingStrategyKind;

    /// Find an unblocked, eligible node whose structure covers `node`.
    /// Nodes older than `node` already carry their final status and
    /// candidacy for this pass.
    fn find_blocker(
        &self,
        graph: &Graph,
        checker: &dyn DirectBlockingChecker,
        cache: &SignatureCache,
        node: NodeId,
    ) -> Option<NodeId>;
}

/// Only strict tree ancestors may block
#[derive(Debug, Default, Clone, Copy)]
pub struct AncestorBlocking;

impl BlockingStrategy for AncestorBlocking {
    fn kind(&self) -> BlockingStrategyKind {
        BlockingStrategyKind::Ancestor
    }

    fn find_blocker(
        &self,
        graph: &Graph,
        checker: &dyn DirectBlockingChecker,
        cache: &SignatureCache,
        node: NodeId,
    ) -> Option<NodeId> {
        let signature = cache.signature(node)?;
        let covers = |ancestor: NodeId| {
            if checker.signature_decides() {
                cache.signature(ancestor) == Some(signature)
            } else {
                checker.is_blocked_by(graph, node, ancestor)
            }
        };

        let mut current = graph.node(node)?.parent();
        while let Some(ancestor) = current {
            if cache.is_candidate(ancestor) && covers(ancestor) {
                return Some(ancestor);
            }
            current = graph.node(ancestor)?.parent();
        }
        None
    }
}

/// Any earlier-created unblocked node may block
#[derive(Debug, Default, Clone, Copy)]
pub struct AnywhereBlocking;

impl BlockingStrategy for AnywhereBlocking {
    fn kind(&self) -> BlockingStrategyKind {
        BlockingStrategyKind::Anywhere
    }

    fn find_blocker(
        &self,
        graph: &Graph,
        checker: &dyn DirectBlockingChecker,
        cache: &SignatureCache,
        node: NodeId,
    ) -> Option<NodeId> {
        let signature = cache.signature(node)?;
        cache
            .candidates(signature)
            .take_while(|candidate| *candidate < node)
            .find(|candidate| checker.signature_decides() || checker.is_blocked_by(graph, node, *candidate))
    }
}

pub fn strategy_for(kind: BlockingStrategyKind) -> Box<dyn BlockingStrategy> {
    match kind {
        BlockingStrategyKind::Anywhere => Box::new(AnywhereBlocking),
        BlockingStrategyKind::Ancestor | BlockingStrategyKind::Auto => Box::new(AncestorBlocking),
    }
}
