//! ブロッキング
//!
//! 直接ブロッキング判定、シグネチャキャッシュ、ブロッキング戦略を束ね、
//! グラフ変更のバッチごとにノードのブロッキング状態を再計算します。

pub mod checker;
pub mod signature;
pub mod strategy;

pub use checker::{checker_for, DirectBlockingChecker, PairwiseChecker, SingleEqualityChecker, SingleSubsetChecker};
pub use signature::{BlockingSignature, SignatureCache, SignatureId};
pub use strategy::{strategy_for, AncestorBlocking, AnywhereBlocking, BlockingStrategy};

use crate::config::{BlockingCheckerKind, BlockingStrategyKind};
use crate::graph::{BlockingState, Graph, Node, NodeId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Keeps every live node's blocking status in step with the graph.
///
/// After the first pass only nodes affected by the latest batch of
/// mutations are re-examined: nodes whose signature changed, nodes blocked
/// by them, newer nodes sharing a signature that gained a candidate, and
/// the children of nodes whose status changed.
pub struct BlockingManager {
    strategy: Box<dyn BlockingStrategy>,
    checker: Box<dyn DirectBlockingChecker>,
    cache: SignatureCache,
    /// blocker → nodes it directly blocks
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
    stale: bool,
}

impl BlockingManager {
    pub fn new(strategy: BlockingStrategyKind, checker: BlockingCheckerKind) -> Self {
        Self {
            strategy: strategy_for(strategy),
            checker: checker_for(checker),
            cache: SignatureCache::new(),
            dependents: BTreeMap::new(),
            stale: true,
        }
    }

    pub fn strategy_kind(&self) -> BlockingStrategyKind {
        self.strategy.kind()
    }

    pub fn checker_kind(&self) -> BlockingCheckerKind {
        self.checker.kind()
    }

    pub fn checker(&self) -> &dyn DirectBlockingChecker {
        self.checker.as_ref()
    }

    pub fn cache(&self) -> &SignatureCache {
        &self.cache
    }

    /// Force a full refresh, e.g. after backtracking
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Recompute blocking after a batch of graph mutations.
    ///
    /// Roots are never blocked; a node with a blocked parent is indirectly
    /// blocked; any other node is directly blocked when the strategy finds
    /// a blocker. Nodes are examined oldest first, so parents and blockers
    /// are settled before the nodes that depend on them. Returns the nodes
    /// that stopped being indirectly blocked.
    pub fn update(&mut self, graph: &mut Graph) -> Vec<NodeId> {
        let changed = graph.take_changed();
        let reparented = graph.take_reparented();
        if changed.is_empty() && !self.stale {
            return Vec::new();
        }

        let rebuilding = self.stale;
        let mut work = BTreeSet::new();
        let mut resigned = BTreeSet::new();

        if rebuilding {
            self.cache.clear();
            self.dependents.clear();
            for node in graph.live_nodes().map(Node::id).collect::<Vec<_>>() {
                self.cache.refresh(node, self.checker.signature(graph, node));
                work.insert(node);
            }
            self.stale = false;
        } else {
            let mut dirty = changed.clone();
            if self.checker.depends_on_parent() {
                for node in &changed {
                    if let Some(record) = graph.node(*node) {
                        dirty.extend(record.children());
                    }
                }
            }
            for node in dirty {
                if !graph.is_live(node) {
                    self.forget(graph, node, &mut work);
                    continue;
                }
                if self.cache.refresh(node, self.checker.signature(graph, node)) {
                    resigned.insert(node);
                    work.extend(self.dependents.get(&node).into_iter().flatten().copied());
                    if !self.checker.signature_decides() {
                        work.extend(descendants(graph, node, |record| {
                            record.blocking() == BlockingState::Unblocked
                        }));
                    }
                }
                work.insert(node);
            }
            // ancestor chains below a moved subtree changed
            for node in reparented {
                work.extend(descendants(graph, node, |_| true));
            }
        }

        let mut thawed = Vec::new();
        while let Some(node) = work.pop_first() {
            let Some(record) = graph.node(node).filter(|record| record.is_live()) else {
                continue;
            };
            let previous = record.blocking();
            let state = match record.parent() {
                None => BlockingState::Unblocked,
                Some(parent) if graph.blocking(parent).is_blocked() => BlockingState::Indirect,
                Some(_) => match self.strategy.find_blocker(graph, self.checker.as_ref(), &self.cache, node) {
                    Some(blocker) => BlockingState::Direct(blocker),
                    None => BlockingState::Unblocked,
                },
            };

            let candidate = state == BlockingState::Unblocked && self.checker.can_block(graph, node);
            let toggled = self.cache.set_candidate(node, candidate);
            if !candidate && toggled {
                work.extend(self.dependents.get(&node).into_iter().flatten().copied());
            }
            if candidate && !rebuilding && (toggled || resigned.contains(&node)) {
                if let Some(signature) = self.cache.signature(node) {
                    work.extend(
                        self.cache
                            .members_after(signature, node)
                            .filter(|member| graph.blocking(*member) == BlockingState::Unblocked),
                    );
                }
            }

            if rebuilding || state != previous {
                self.relink(node, previous.blocker(), state.blocker());
            }
            if state != previous {
                debug!(node = %node, from = ?previous, to = ?state, "blocking status changed");
                graph.set_blocking(node, state);
                if previous == BlockingState::Indirect {
                    thawed.push(node);
                }
                if let Some(record) = graph.node(node) {
                    work.extend(record.children());
                }
            }
        }

        thawed
    }

    /// Drop a merged or pruned node and requeue the nodes it was blocking
    fn forget(&mut self, graph: &Graph, node: NodeId, work: &mut BTreeSet<NodeId>) {
        self.cache.remove(node);
        if let Some(blocker) = graph.node(node).and_then(|record| record.blocking().blocker()) {
            self.relink(node, Some(blocker), None);
        }
        if let Some(dependents) = self.dependents.remove(&node) {
            work.extend(dependents);
        }
    }

    fn relink(&mut self, node: NodeId, from: Option<NodeId>, to: Option<NodeId>) {
        if let Some(from) = from {
            if let Some(dependents) = self.dependents.get_mut(&from) {
                dependents.remove(&node);
                if dependents.is_empty() {
                    self.dependents.remove(&from);
                }
            }
        }
        if let Some(to) = to {
            self.dependents.entry(to).or_default().insert(node);
        }
    }
}

/// Live descendants of `node`, descending only through nodes that pass `keep`
fn descendants(graph: &Graph, node: NodeId, keep: impl Fn(&Node) -> bool) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack: Vec<NodeId> = graph.node(node).into_iter().flat_map(Node::children).collect();
    while let Some(next) = stack.pop() {
        let Some(record) = graph.node(next) else { continue };
        if record.is_live() && keep(record) {
            found.push(next);
            stack.extend(record.children());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypertab_model::Concept;

    fn chain(graph: &mut Graph, length: usize, label: &[&str]) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = Vec::new();
        for _ in 0..length {
            let parent = nodes.last().copied();
            let node = graph.create_node(parent);
            if let Some(parent) = parent {
                graph.add_atomic_role("R", parent, node);
            }
            for name in label {
                graph.add_concept(node, Concept::atomic(*name)).unwrap();
            }
            nodes.push(node);
        }
        nodes
    }

    #[test]
    fn test_ancestor_blocking_blocks_and_freezes_subtree() {
        let mut graph = Graph::new();
        let nodes = chain(&mut graph, 4, &["A"]);
        let mut manager = BlockingManager::new(BlockingStrategyKind::Ancestor, BlockingCheckerKind::SingleSubset);

        manager.update(&mut graph);
        assert_eq!(graph.blocking(nodes[0]), BlockingState::Unblocked);
        assert_eq!(graph.blocking(nodes[1]), BlockingState::Direct(nodes[0]));
        assert_eq!(graph.blocking(nodes[2]), BlockingState::Indirect);
        assert_eq!(graph.blocking(nodes[3]), BlockingState::Indirect);
    }

    #[test]
    fn test_label_change_unblocks_and_thaws() {
        let mut graph = Graph::new();
        let nodes = chain(&mut graph, 3, &["A"]);
        let mut manager = BlockingManager::new(BlockingStrategyKind::Ancestor, BlockingCheckerKind::SingleEquality);
        manager.update(&mut graph);
        assert_eq!(graph.blocking(nodes[2]), BlockingState::Indirect);

        graph.add_concept(nodes[1], Concept::atomic("B")).unwrap();
        let thawed = manager.update(&mut graph);

        assert_eq!(graph.blocking(nodes[1]), BlockingState::Unblocked);
        // the root now covers the grandchild directly
        assert_eq!(graph.blocking(nodes[2]), BlockingState::Direct(nodes[0]));
        assert_eq!(thawed, vec![nodes[2]]);
    }

    #[test]
    fn test_anywhere_blocking_uses_earlier_unblocked_nodes() {
        let mut graph = Graph::new();
        let root = graph.create_node(None);
        let left = graph.create_node(Some(root));
        let right = graph.create_node(Some(root));
        graph.add_concept(root, Concept::atomic("Root")).unwrap();
        graph.add_concept(left, Concept::atomic("A")).unwrap();
        graph.add_concept(right, Concept::atomic("A")).unwrap();

        let mut manager = BlockingManager::new(BlockingStrategyKind::Anywhere, BlockingCheckerKind::SingleEquality);
        manager.update(&mut graph);

        assert_eq!(graph.blocking(left), BlockingState::Unblocked);
        assert_eq!(graph.blocking(right), BlockingState::Direct(left));
    }

    #[test]
    fn test_pairwise_root_never_blocks() {
        let mut graph = Graph::new();
        let nodes = chain(&mut graph, 3, &["A"]);
        graph.add_concept(nodes[0], Concept::atomic("Root")).unwrap();
        let mut manager = BlockingManager::new(BlockingStrategyKind::Ancestor, BlockingCheckerKind::Pairwise);
        manager.update(&mut graph);

        assert_eq!(graph.blocking(nodes[1]), BlockingState::Unblocked);
        assert_eq!(graph.blocking(nodes[2]), BlockingState::Unblocked);

        let grandchild = graph.create_node(Some(nodes[2]));
        graph.add_atomic_role("R", nodes[2], grandchild);
        graph.add_concept(grandchild, Concept::atomic("A")).unwrap();
        manager.update(&mut graph);
        assert_eq!(graph.blocking(grandchild), BlockingState::Direct(nodes[2]));
    }

    #[test]
    fn test_incremental_update_follows_blockers_and_new_candidates() {
        let mut graph = Graph::new();
        let root = graph.create_node(None);
        let first = graph.create_node(Some(root));
        let second = graph.create_node(Some(root));
        let frozen = graph.create_node(Some(second));
        let late = graph.create_node(Some(root));
        graph.add_concept(root, Concept::atomic("Root")).unwrap();
        graph.add_concept(first, Concept::atomic("A")).unwrap();
        graph.add_concept(second, Concept::atomic("A")).unwrap();
        graph.add_concept(frozen, Concept::atomic("C")).unwrap();
        graph.add_concept(late, Concept::atomic("C")).unwrap();

        let mut manager = BlockingManager::new(BlockingStrategyKind::Anywhere, BlockingCheckerKind::SingleEquality);
        manager.update(&mut graph);
        assert_eq!(graph.blocking(second), BlockingState::Direct(first));
        assert_eq!(graph.blocking(frozen), BlockingState::Indirect);
        assert_eq!(graph.blocking(late), BlockingState::Unblocked);

        // the blocker's label moves away, so its dependent and that subtree are revisited
        graph.add_concept(first, Concept::atomic("B")).unwrap();
        let thawed = manager.update(&mut graph);

        assert_eq!(thawed, vec![frozen]);
        assert_eq!(graph.blocking(second), BlockingState::Unblocked);
        assert_eq!(graph.blocking(frozen), BlockingState::Unblocked);
        assert_eq!(graph.blocking(late), BlockingState::Direct(frozen));
        assert_eq!(manager.cache().bucket_count(), 4);
        assert_eq!(manager.cache().signature(frozen), manager.cache().signature(late));
    }

    #[test]
    fn test_quiet_update_touches_nothing() {
        let mut graph = Graph::new();
        chain(&mut graph, 3, &["A"]);
        let mut manager = BlockingManager::new(BlockingStrategyKind::Ancestor, BlockingCheckerKind::SingleEquality);
        manager.update(&mut graph);
        let before: Vec<BlockingState> = graph.live_nodes().map(Node::blocking).collect();

        assert!(manager.update(&mut graph).is_empty());
        assert_eq!(graph.live_nodes().map(Node::blocking).collect::<Vec<_>>(), before);
    }
}
