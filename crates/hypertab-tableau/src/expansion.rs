//! 展開戦略
//!
//! 保留中の作業を選びます: 新しい事実、未処理の選言、
//! そしてブロックされていないノードの存在量化要求の順です。

use crate::config::ExpansionOrder;
use crate::disjunction::{DisjunctionId, DisjunctionStore};
use crate::graph::{BlockingState, Fact, Graph, Node, NodeId};
use crate::Clash;
use hypertab_model::{AtLeast, Concept};
use std::collections::VecDeque;
use tracing::debug;

/// FIFO queue of facts awaiting rule evaluation
#[derive(Debug, Default)]
pub struct Agenda {
    facts: VecDeque<Fact>,
}

impl Agenda {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fact: Fact) {
        self.facts.push_back(fact);
    }

    pub fn extend(&mut self, facts: impl IntoIterator<Item = Fact>) {
        self.facts.extend(facts);
    }

    pub fn pop(&mut self) -> Option<Fact> {
        self.facts.pop_front()
    }

    pub fn clear(&mut self) {
        self.facts.clear();
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// Next unit of work for the saturation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgendaItem {
    Fact(Fact),
    Disjunction(DisjunctionId),
    Existential { node: NodeId, requirement: AtLeast },
}

/// Selection policy for pending work
pub trait ExpansionStrategy: Send + Sync {
    fn order(&self) -> ExpansionOrder;

    /// Next unblocked node with an unsatisfied existential. Nodes passed
    /// over on the way are marked so later scans skip them.
    fn next_existential(&self, graph: &mut Graph) -> Option<(NodeId, AtLeast)>;

    /// Facts first, then the newest disjunction not touching a frozen node,
    /// then existentials
    fn pick_next(&self, agenda: &mut Agenda, graph: &mut Graph, disjunctions: &DisjunctionStore) -> Option<AgendaItem> {
        if let Some(fact) = agenda.pop() {
            return Some(AgendaItem::Fact(fact));
        }
        if let Some(id) = next_disjunction(graph, disjunctions) {
            return Some(AgendaItem::Disjunction(id));
        }
        self.next_existential(graph)
            .map(|(node, requirement)| AgendaItem::Existential { node, requirement })
    }
}

/// Breadth-first: the oldest node is expanded first
#[derive(Debug, Default, Clone, Copy)]
pub struct CreationOrderExpansion;

impl ExpansionStrategy for CreationOrderExpansion {
    fn order(&self) -> ExpansionOrder {
        ExpansionOrder::CreationOrder
    }

    fn next_existential(&self, graph: &mut Graph) -> Option<(NodeId, AtLeast)> {
        let mut satisfied = Vec::new();
        let found = first_unsatisfied(graph, graph.nodes(), &mut satisfied);
        mark_satisfied(graph, satisfied);
        found
    }
}

/// Depth-first: the newest node is expanded first
#[derive(Debug, Default, Clone, Copy)]
pub struct NewestFirstExpansion;

impl ExpansionStrategy for NewestFirstExpansion {
    fn order(&self) -> ExpansionOrder {
        ExpansionOrder::NewestFirst
    }

    fn next_existential(&self, graph: &mut Graph) -> Option<(NodeId, AtLeast)> {
        let mut satisfied = Vec::new();
        let found = first_unsatisfied(graph, graph.nodes_newest_first(), &mut satisfied);
        mark_satisfied(graph, satisfied);
        found
    }
}

pub fn expansion_for(order: ExpansionOrder) -> Box<dyn ExpansionStrategy> {
    match order {
        ExpansionOrder::CreationOrder => Box::new(CreationOrderExpansion),
        ExpansionOrder::NewestFirst => Box::new(NewestFirstExpansion),
    }
}

fn may_expand(node: &Node) -> bool {
    node.is_live() && node.blocking() == BlockingState::Unblocked && !node.existentials_satisfied()
}

fn first_unsatisfied<'a>(
    graph: &'a Graph,
    nodes: impl Iterator<Item = &'a Node>,
    satisfied: &mut Vec<NodeId>,
) -> Option<(NodeId, AtLeast)> {
    nodes
        .filter(|node| may_expand(node))
        .find_map(|node| match unsatisfied_existential(graph, node) {
            Some(requirement) => Some((node.id(), requirement)),
            None => {
                satisfied.push(node.id());
                None
            }
        })
}

fn mark_satisfied(graph: &mut Graph, nodes: Vec<NodeId>) {
    for node in nodes {
        graph.mark_existentials_satisfied(node);
    }
}

fn next_disjunction(graph: &Graph, disjunctions: &DisjunctionStore) -> Option<DisjunctionId> {
    disjunctions
        .unprocessed()
        .find(|(_, disjunction)| {
            !disjunction
                .disjuncts()
                .iter()
                .flat_map(|disjunct| disjunct.arguments.iter())
                .any(|node| graph.is_indirectly_blocked(*node))
        })
        .map(|(id, _)| id)
}

/// First at-least requirement of a node that its neighbours do not meet
pub fn unsatisfied_existential(graph: &Graph, node: &Node) -> Option<AtLeast> {
    node.label()
        .iter()
        .filter_map(|concept| match concept {
            Concept::AtLeast(at_least) => Some(at_least),
            _ => None,
        })
        .find(|at_least| !is_satisfied(graph, node.id(), at_least))
        .cloned()
}

/// ≥ n R.C holds when n pairwise-unequal R-neighbours carry C
pub fn is_satisfied(graph: &Graph, node: NodeId, at_least: &AtLeast) -> bool {
    let needed = at_least.number as usize;
    let candidates: Vec<NodeId> = graph
        .neighbours(node, &at_least.role)
        .into_iter()
        .filter(|neighbour| graph.has_concept(*neighbour, &at_least.filler))
        .collect();

    if candidates.len() < needed {
        return false;
    }
    needed <= 1 || has_unequal_clique(graph, &candidates, &mut Vec::with_capacity(needed), 0, needed)
}

fn has_unequal_clique(graph: &Graph, candidates: &[NodeId], chosen: &mut Vec<NodeId>, start: usize, size: usize) -> bool {
    if chosen.len() == size {
        return true;
    }
    for position in start..candidates.len() {
        if candidates.len() - position < size - chosen.len() {
            break;
        }
        let candidate = candidates[position];
        if chosen.iter().all(|other| graph.are_unequal(*other, candidate)) {
            chosen.push(candidate);
            if has_unequal_clique(graph, candidates, chosen, position + 1, size) {
                return true;
            }
            chosen.pop();
        }
    }
    false
}

/// Create n fresh, pairwise-unequal tree children carrying the filler
pub fn expand_existential(graph: &mut Graph, node: NodeId, at_least: &AtLeast) -> Result<Vec<NodeId>, Clash> {
    let node = graph.find(node);
    let mut created = Vec::with_capacity(at_least.number as usize);

    for _ in 0..at_least.number {
        let child = graph.create_node(Some(node));
        graph.add_role(&at_least.role, node, child);
        graph.add_concept(child, (*at_least.filler).clone())?;
        created.push(child);
    }
    for (position, left) in created.iter().enumerate() {
        for right in &created[position + 1..] {
            graph.add_inequality(*left, *right)?;
        }
    }

    debug!(node = %node, requirement = %at_least, created = created.len(), "existential expanded");
    Ok(created)
}
