//! 選言と時系列バックトラッキング探索

use crate::disjunction::{DisjunctionId, DisjunctionStore, GroundDisjunct};
use crate::graph::Graph;
use crate::tableau::TableauStatistics;
use crate::{Clash, ClashReason};
use itertools::Itertools;
use tracing::debug;

/// Positions in the graph and disjunction logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub graph: usize,
    pub disjunctions: usize,
}

impl Checkpoint {
    pub fn take(graph: &Graph, disjunctions: &DisjunctionStore) -> Self {
        Self {
            graph: graph.checkpoint(),
            disjunctions: disjunctions.checkpoint(),
        }
    }

    pub fn restore(&self, graph: &mut Graph, disjunctions: &mut DisjunctionStore) {
        graph.undo_to(self.graph);
        disjunctions.undo_to(self.disjunctions);
    }
}

/// Untried alternatives of a branched disjunction
#[derive(Debug, Clone)]
pub struct ChoicePoint {
    checkpoint: Checkpoint,
    disjunction: DisjunctionId,
    alternatives: Vec<GroundDisjunct>,
    next: usize,
}

impl ChoicePoint {
    pub fn disjunction(&self) -> DisjunctionId {
        self.disjunction
    }

    pub fn remaining(&self) -> usize {
        self.alternatives.len() - self.next
    }
}

/// How processing a disjunction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branching {
    /// Some disjunct already held
    Satisfied,
    /// One disjunct was left and has been derived
    Forced,
    /// A choice point was pushed and the first alternative derived
    Branched,
}

/// Chronological backtracking over ground disjunctions
#[derive(Debug)]
pub struct BacktrackingSearch {
    choice_points: Vec<ChoicePoint>,
    semantic_branching: bool,
}

impl BacktrackingSearch {
    pub fn new(semantic_branching: bool) -> Self {
        Self {
            choice_points: Vec::new(),
            semantic_branching,
        }
    }

    pub fn depth(&self) -> usize {
        self.choice_points.len()
    }

    pub fn reset(&mut self) {
        self.choice_points.clear();
    }

    /// Take a disjunction off the unprocessed list and branch on it
    pub fn process(
        &mut self,
        id: DisjunctionId,
        graph: &mut Graph,
        disjunctions: &mut DisjunctionStore,
        statistics: &mut TableauStatistics,
    ) -> Result<Branching, Clash> {
        let Some(disjunction) = disjunctions.get(id) else {
            return Ok(Branching::Satisfied);
        };
        let disjuncts = disjunction.disjuncts().to_vec();
        disjunctions.unlink(id);

        let mut alternatives: Vec<GroundDisjunct> = Vec::with_capacity(disjuncts.len());
        for disjunct in &disjuncts {
            let disjunct = disjunct.resolve(graph);
            if disjunct.holds(graph) {
                return Ok(Branching::Satisfied);
            }
            if !disjunct.is_refuted(graph) && !alternatives.contains(&disjunct) {
                alternatives.push(disjunct);
            }
        }

        match alternatives.len() {
            0 => Err(ClashReason::RefutedDisjunction(disjuncts.iter().join(" v ")).into()),
            1 => {
                alternatives[0].derive(graph)?;
                Ok(Branching::Forced)
            }
            _ => {
                let checkpoint = Checkpoint::take(graph, disjunctions);
                let first = alternatives[0].clone();
                debug!(
                    disjunction = %id,
                    alternatives = alternatives.len(),
                    depth = self.choice_points.len() + 1,
                    "branching on {}",
                    first
                );
                self.choice_points.push(ChoicePoint {
                    checkpoint,
                    disjunction: id,
                    alternatives,
                    next: 1,
                });
                statistics.branches += 1;
                first.derive(graph)?;
                Ok(Branching::Branched)
            }
        }
    }

    /// Undo to the newest choice point with an untried alternative and
    /// derive that alternative. Returns `false` when no choice point is left.
    pub fn backtrack(
        &mut self,
        graph: &mut Graph,
        disjunctions: &mut DisjunctionStore,
        statistics: &mut TableauStatistics,
    ) -> bool {
        while let Some(mut choice_point) = self.choice_points.pop() {
            statistics.backtracks += 1;
            choice_point.checkpoint.restore(graph, disjunctions);

            let Some(alternative) = choice_point.alternatives.get(choice_point.next).cloned() else {
                continue;
            };
            let refuted: Vec<GroundDisjunct> = choice_point.alternatives[..choice_point.next].to_vec();
            choice_point.next += 1;

            debug!(
                disjunction = %choice_point.disjunction,
                remaining = choice_point.remaining(),
                depth = self.choice_points.len(),
                "backtracking to {}",
                alternative
            );

            if choice_point.remaining() > 0 {
                self.choice_points.push(choice_point);
            }

            match self.derive_alternative(&alternative, &refuted, graph) {
                Ok(()) => return true,
                Err(clash) => {
                    statistics.clashes += 1;
                    debug!(%clash, "alternative clashed immediately");
                }
            }
        }
        false
    }

    fn derive_alternative(
        &self,
        alternative: &GroundDisjunct,
        refuted: &[GroundDisjunct],
        graph: &mut Graph,
    ) -> Result<(), Clash> {
        alternative.derive(graph)?;
        if self.semantic_branching {
            for negation in refuted.iter().filter_map(GroundDisjunct::negation) {
                negation.derive(graph)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use hypertab_model::Concept;

    fn setup() -> (Graph, DisjunctionStore, NodeId) {
        let mut graph = Graph::new();
        let node = graph.create_node(None);
        (graph, DisjunctionStore::new(), node)
    }

    #[test]
    fn test_branch_then_backtrack_with_semantic_branching() {
        let (mut graph, mut store, node) = setup();
        let mut statistics = TableauStatistics::default();
        let mut search = BacktrackingSearch::new(true);
        let id = store.add(vec![
            GroundDisjunct::concept(Concept::atomic("P"), node),
            GroundDisjunct::concept(Concept::atomic("Q"), node),
        ]);

        assert_eq!(
            search.process(id, &mut graph, &mut store, &mut statistics).unwrap(),
            Branching::Branched
        );
        assert!(graph.has_concept(node, &Concept::atomic("P")));
        assert_eq!(store.unprocessed_count(), 0);

        assert!(search.backtrack(&mut graph, &mut store, &mut statistics));
        assert!(!graph.has_concept(node, &Concept::atomic("P")));
        assert!(graph.has_concept(node, &Concept::atomic("Q")));
        assert!(graph.has_concept(node, &Concept::negated("P")));
        // the disjunction stays processed and the last alternative leaves no choice point
        assert_eq!(store.unprocessed_count(), 0);
        assert_eq!(search.depth(), 0);

        assert!(!search.backtrack(&mut graph, &mut store, &mut statistics));
        assert_eq!(statistics.branches, 1);
    }

    #[test]
    fn test_satisfied_disjunction_does_not_branch() {
        let (mut graph, mut store, node) = setup();
        let mut statistics = TableauStatistics::default();
        let mut search = BacktrackingSearch::new(true);
        graph.add_concept(node, Concept::atomic("Q")).unwrap();
        let id = store.add(vec![
            GroundDisjunct::concept(Concept::atomic("P"), node),
            GroundDisjunct::concept(Concept::atomic("Q"), node),
        ]);

        assert_eq!(
            search.process(id, &mut graph, &mut store, &mut statistics).unwrap(),
            Branching::Satisfied
        );
        assert_eq!(search.depth(), 0);
    }

    #[test]
    fn test_refuted_disjuncts_force_the_rest() {
        let (mut graph, mut store, node) = setup();
        let mut statistics = TableauStatistics::default();
        let mut search = BacktrackingSearch::new(false);
        graph.add_concept(node, Concept::negated("P")).unwrap();
        let id = store.add(vec![
            GroundDisjunct::concept(Concept::atomic("P"), node),
            GroundDisjunct::concept(Concept::atomic("Q"), node),
        ]);

        assert_eq!(
            search.process(id, &mut graph, &mut store, &mut statistics).unwrap(),
            Branching::Forced
        );
        assert!(graph.has_concept(node, &Concept::atomic("Q")));
    }

    #[test]
    fn test_three_alternatives_keep_choice_point_until_last() {
        let (mut graph, mut store, node) = setup();
        let mut statistics = TableauStatistics::default();
        let mut search = BacktrackingSearch::new(false);
        let id = store.add(vec![
            GroundDisjunct::concept(Concept::atomic("A"), node),
            GroundDisjunct::concept(Concept::atomic("B"), node),
            GroundDisjunct::concept(Concept::atomic("C"), node),
        ]);

        search.process(id, &mut graph, &mut store, &mut statistics).unwrap();
        assert!(search.backtrack(&mut graph, &mut store, &mut statistics));
        assert_eq!(search.depth(), 1);
        assert!(graph.has_concept(node, &Concept::atomic("B")));
        assert!(!graph.has_concept(node, &Concept::negated("A")));

        assert!(search.backtrack(&mut graph, &mut store, &mut statistics));
        assert_eq!(search.depth(), 0);
        assert!(graph.has_concept(node, &Concept::atomic("C")));
    }
}
