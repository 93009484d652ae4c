//! 直接ブロッキング判定

use super::signature::BlockingSignature;
use crate::config::BlockingCheckerKind;
use crate::graph::{Graph, NodeId};

/// Pure comparison policy over current label and edge state
pub trait DirectBlockingChecker: Send + Sync {
    fn kind(&self) -> BlockingCheckerKind;

    /// Whether `blocker`'s structure covers `blocked`'s
    fn is_blocked_by(&self, graph: &Graph, blocked: NodeId, blocker: NodeId) -> bool;

    /// Whether a node may serve as a blocker at all
    fn can_block(&self, _graph: &Graph, _node: NodeId) -> bool {
        true
    }

    /// Cache key; equal signatures imply `is_blocked_by` in both directions
    fn signature(&self, graph: &Graph, node: NodeId) -> BlockingSignature;

    /// Whether `is_blocked_by` holds exactly when signatures are equal
    fn signature_decides(&self) -> bool {
        true
    }

    /// Whether a node's signature changes when its parent changes
    fn depends_on_parent(&self) -> bool {
        false
    }
}

/// L(x) ⊆ L(y)
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleSubsetChecker;

impl DirectBlockingChecker for SingleSubsetChecker {
    fn kind(&self) -> BlockingCheckerKind {
        BlockingCheckerKind::SingleSubset
    }

    fn is_blocked_by(&self, graph: &Graph, blocked: NodeId, blocker: NodeId) -> bool {
        match (graph.node(blocked), graph.node(blocker)) {
            (Some(blocked), Some(blocker)) => blocked.label().is_subset(blocker.label()),
            _ => false,
        }
    }

    fn signature(&self, graph: &Graph, node: NodeId) -> BlockingSignature {
        BlockingSignature::single(graph, node)
    }

    fn signature_decides(&self) -> bool {
        false
    }
}

/// L(x) = L(y)
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleEqualityChecker;

impl DirectBlockingChecker for SingleEqualityChecker {
    fn kind(&self) -> BlockingCheckerKind {
        BlockingCheckerKind::SingleEquality
    }

    fn is_blocked_by(&self, graph: &Graph, blocked: NodeId, blocker: NodeId) -> bool {
        match (graph.node(blocked), graph.node(blocker)) {
            (Some(blocked), Some(blocker)) => blocked.label() == blocker.label(),
            _ => false,
        }
    }

    fn signature(&self, graph: &Graph, node: NodeId) -> BlockingSignature {
        BlockingSignature::single(graph, node)
    }

}

/// L(x) = L(y), L(x') = L(y') and equal edges between each node and its parent
#[derive(Debug, Default, Clone, Copy)]
pub struct PairwiseChecker;

impl DirectBlockingChecker for PairwiseChecker {
    fn kind(&self) -> BlockingCheckerKind {
        BlockingCheckerKind::Pairwise
    }

    fn is_blocked_by(&self, graph: &Graph, blocked: NodeId, blocker: NodeId) -> bool {
        self.can_block(graph, blocked)
            && self.can_block(graph, blocker)
            && BlockingSignature::pairwise(graph, blocked) == BlockingSignature::pairwise(graph, blocker)
    }

    fn can_block(&self, graph: &Graph, node: NodeId) -> bool {
        graph.node(node).is_some_and(|record| record.parent().is_some())
    }

    fn signature(&self, graph: &Graph, node: NodeId) -> BlockingSignature {
        BlockingSignature::pairwise(graph, node)
    }

    fn depends_on_parent(&self) -> bool {
        true
    }
}

pub fn checker_for(kind: BlockingCheckerKind) -> Box<dyn DirectBlockingChecker> {
    match kind {
        BlockingCheckerKind::SingleSubset => Box::new(SingleSubsetChecker),
        BlockingCheckerKind::SingleEquality => Box::new(SingleEqualityChecker),
        BlockingCheckerKind::Pairwise | BlockingCheckerKind::Auto => Box::new(PairwiseChecker),
    }
}
