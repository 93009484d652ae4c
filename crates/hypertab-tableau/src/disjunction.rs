//! 基底選言
//!
//! 未処理の基底選言を双方向リストで保持します。先頭は最も新しく
//! 追加された選言で、`previous` を辿ると古いものへ進みます。

use crate::graph::{Graph, NodeId};
use crate::Clash;
use hypertab_model::{Concept, DLPredicate, Role};
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisjunctionId(pub usize);

impl fmt::Display for DisjunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Predicate applied to fixed node arguments; roles are stored atomic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroundDisjunct {
    pub predicate: DLPredicate,
    pub arguments: Vec<NodeId>,
}

impl GroundDisjunct {
    /// Build a disjunct, rewriting `R-(x,y)` to `R(y,x)`
    pub fn new(predicate: DLPredicate, mut arguments: Vec<NodeId>) -> Self {
        match predicate {
            DLPredicate::Role(Role::Inverse(name)) => {
                arguments.reverse();
                Self {
                    predicate: DLPredicate::Role(Role::Atomic(name)),
                    arguments,
                }
            }
            predicate => Self { predicate, arguments },
        }
    }

    pub fn concept(concept: Concept, node: NodeId) -> Self {
        Self::new(DLPredicate::Concept(concept), vec![node])
    }

    pub fn equality(left: NodeId, right: NodeId) -> Self {
        Self::new(DLPredicate::Equality, vec![left, right])
    }

    pub fn inequality(left: NodeId, right: NodeId) -> Self {
        Self::new(DLPredicate::Inequality, vec![left, right])
    }

    /// Same disjunct over current equality-class representatives
    pub fn resolve(&self, graph: &Graph) -> Self {
        Self {
            predicate: self.predicate.clone(),
            arguments: self.arguments.iter().map(|node| graph.find(*node)).collect(),
        }
    }

    /// Whether the disjunct already holds in the graph
    pub fn holds(&self, graph: &Graph) -> bool {
        match (&self.predicate, self.arguments.as_slice()) {
            (DLPredicate::Concept(concept), [node]) => graph.has_concept(*node, concept),
            (DLPredicate::Role(role), [from, to]) => graph.has_role(role, *from, *to),
            (DLPredicate::Equality, [left, right]) => graph.find(*left) == graph.find(*right),
            (DLPredicate::Inequality, [left, right]) => graph.are_unequal(*left, *right),
            _ => false,
        }
    }

    /// Whether deriving the disjunct would clash immediately
    pub fn is_refuted(&self, graph: &Graph) -> bool {
        match (&self.predicate, self.arguments.as_slice()) {
            (DLPredicate::Concept(Concept::Nothing), _) => true,
            (DLPredicate::Concept(concept @ (Concept::Atomic(_) | Concept::Negated(_))), [node]) => concept
                .complement()
                .is_some_and(|complement| graph.has_concept(*node, &complement)),
            (DLPredicate::Equality, [left, right]) => graph.are_unequal(*left, *right),
            (DLPredicate::Inequality, [left, right]) => graph.find(*left) == graph.find(*right),
            _ => false,
        }
    }

    /// Negation asserted by semantic branching once this disjunct is refuted
    pub fn negation(&self) -> Option<GroundDisjunct> {
        match (&self.predicate, self.arguments.as_slice()) {
            (DLPredicate::Concept(concept @ (Concept::Atomic(_) | Concept::Negated(_))), [node]) => {
                concept.complement().map(|complement| Self::concept(complement, *node))
            }
            (DLPredicate::Equality, [left, right]) => Some(Self::inequality(*left, *right)),
            _ => None,
        }
    }

    /// Assert the disjunct in the graph
    pub fn derive(&self, graph: &mut Graph) -> Result<(), Clash> {
        match (&self.predicate, self.arguments.as_slice()) {
            (DLPredicate::Concept(concept), [node]) => graph.add_concept(*node, concept.clone()).map(|_| ()),
            (DLPredicate::Role(role), [from, to]) => {
                graph.add_role(role, *from, *to);
                Ok(())
            }
            (DLPredicate::Equality, [left, right]) => graph.merge(*left, *right).map(|_| ()),
            (DLPredicate::Inequality, [left, right]) => graph.add_inequality(*left, *right).map(|_| ()),
            _ => Ok(()),
        }
    }

    pub fn mentions(&self, node: NodeId) -> bool {
        self.arguments.contains(&node)
    }
}

impl fmt::Display for GroundDisjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.predicate, self.arguments.as_slice()) {
            (DLPredicate::Equality, [left, right]) => write!(f, "{} == {}", left, right),
            (DLPredicate::Inequality, [left, right]) => write!(f, "{} != {}", left, right),
            (predicate, arguments) => write!(f, "{}({})", predicate, arguments.iter().join(",")),
        }
    }
}

/// Pending disjunctive fact
#[derive(Debug, Clone)]
pub struct GroundDisjunction {
    disjuncts: Vec<GroundDisjunct>,
    previous: Option<DisjunctionId>,
    next: Option<DisjunctionId>,
    unprocessed: bool,
}

impl GroundDisjunction {
    pub fn disjuncts(&self) -> &[GroundDisjunct] {
        &self.disjuncts
    }

    /// Next older unprocessed disjunction
    pub fn previous(&self) -> Option<DisjunctionId> {
        self.previous
    }

    pub fn is_unprocessed(&self) -> bool {
        self.unprocessed
    }
}

impl fmt::Display for GroundDisjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.disjuncts.iter().join(" v "))
    }
}

#[derive(Debug, Clone, Copy)]
enum StoreChange {
    Added(DisjunctionId),
    Unlinked {
        id: DisjunctionId,
        previous: Option<DisjunctionId>,
        next: Option<DisjunctionId>,
    },
}

/// Arena of ground disjunctions with its own undo log
#[derive(Debug, Default)]
pub struct DisjunctionStore {
    disjunctions: Vec<GroundDisjunction>,
    head: Option<DisjunctionId>,
    log: Vec<StoreChange>,
    unprocessed: usize,
}

impl DisjunctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(&self) -> usize {
        self.log.len()
    }

    pub fn get(&self, id: DisjunctionId) -> Option<&GroundDisjunction> {
        self.disjunctions.get(id.0)
    }

    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed
    }

    /// Add a disjunction at the head of the unprocessed list
    pub fn add(&mut self, disjuncts: Vec<GroundDisjunct>) -> DisjunctionId {
        let id = DisjunctionId(self.disjunctions.len());
        self.disjunctions.push(GroundDisjunction {
            disjuncts,
            previous: self.head,
            next: None,
            unprocessed: true,
        });
        if let Some(head) = self.head {
            self.disjunctions[head.0].next = Some(id);
        }
        self.head = Some(id);
        self.unprocessed += 1;
        self.log.push(StoreChange::Added(id));
        id
    }

    /// Take a disjunction off the unprocessed list
    pub fn unlink(&mut self, id: DisjunctionId) {
        let Some(disjunction) = self.disjunctions.get(id.0) else {
            return;
        };
        if !disjunction.unprocessed {
            return;
        }
        let (previous, next) = (disjunction.previous, disjunction.next);
        self.detach(id);
        self.log.push(StoreChange::Unlinked { id, previous, next });
    }

    fn detach(&mut self, id: DisjunctionId) {
        let (previous, next) = {
            let disjunction = &mut self.disjunctions[id.0];
            disjunction.unprocessed = false;
            (disjunction.previous.take(), disjunction.next.take())
        };
        if let Some(previous) = previous {
            self.disjunctions[previous.0].next = next;
        }
        match next {
            Some(next) => self.disjunctions[next.0].previous = previous,
            None => self.head = previous,
        }
        self.unprocessed -= 1;
    }

    fn relink(&mut self, id: DisjunctionId, previous: Option<DisjunctionId>, next: Option<DisjunctionId>) {
        {
            let disjunction = &mut self.disjunctions[id.0];
            disjunction.unprocessed = true;
            disjunction.previous = previous;
            disjunction.next = next;
        }
        if let Some(previous) = previous {
            self.disjunctions[previous.0].next = Some(id);
        }
        match next {
            Some(next) => self.disjunctions[next.0].previous = Some(id),
            None => self.head = Some(id),
        }
        self.unprocessed += 1;
    }

    /// Unprocessed disjunctions, most recently added first
    pub fn unprocessed(&self) -> impl Iterator<Item = (DisjunctionId, &GroundDisjunction)> + '_ {
        std::iter::successors(self.head, move |id| self.disjunctions[id.0].previous)
            .map(move |id| (id, &self.disjunctions[id.0]))
    }

    pub fn undo_to(&mut self, checkpoint: usize) {
        while self.log.len() > checkpoint {
            let Some(change) = self.log.pop() else { break };
            match change {
                StoreChange::Added(id) => {
                    if self.disjunctions[id.0].unprocessed {
                        self.detach(id);
                    }
                    self.disjunctions.truncate(id.0);
                }
                StoreChange::Unlinked { id, previous, next } => self.relink(id, previous, next),
            }
        }
    }
}
