//! ハイパーレゾリューション規則適用
//!
//! 節は一度だけコンパイルされます: 変数はスロット番号に、定数は
//! ルートノードに置き換えられ、本体アトムは述語キーで索引付けされます。
//! 新しい事実ごとに、それに一致する本体アトムから結合を行います。

use crate::disjunction::{DisjunctionId, DisjunctionStore, GroundDisjunct};
use crate::graph::{Fact, Graph, NodeId};
use crate::{Clash, ClashReason};
use hypertab_model::{Concept, DLClause, DLPredicate, KnowledgeBase, Role, Term};
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Variable(usize),
    Constant(NodeId),
}

#[derive(Debug, Clone)]
enum BodyAtom {
    /// `Thing(x)`: any live node
    Node(Slot),
    Concept(Concept, Slot),
    /// Atomic role, source, target
    Role(String, Slot, Slot),
}

impl BodyAtom {
    fn slots(&self) -> Vec<Slot> {
        match self {
            BodyAtom::Node(slot) | BodyAtom::Concept(_, slot) => vec![*slot],
            BodyAtom::Role(_, from, to) => vec![*from, *to],
        }
    }
}

#[derive(Debug, Clone)]
struct HeadAtom {
    predicate: DLPredicate,
    arguments: Vec<Slot>,
}

#[derive(Debug, Clone)]
struct CompiledClause {
    source: String,
    body: Vec<BodyAtom>,
    head: Vec<HeadAtom>,
    disjunctive: bool,
    variables: usize,
}

/// Compiled clause set with a body-atom index
#[derive(Debug, Default)]
pub struct RuleSet {
    clauses: Vec<CompiledClause>,
    by_node: Vec<(usize, usize)>,
    by_concept: BTreeMap<Concept, Vec<(usize, usize)>>,
    by_role: BTreeMap<String, Vec<(usize, usize)>>,
    unconditional: Vec<usize>,
}

type Bindings = Vec<Option<NodeId>>;

impl RuleSet {
    /// Compile every clause; constants get root nodes in `graph`
    pub fn compile(knowledge_base: &KnowledgeBase, graph: &mut Graph) -> Self {
        let mut rules = RuleSet::default();
        for clause in &knowledge_base.clauses {
            let compiled = compile_clause(clause, graph);
            let index = rules.clauses.len();

            if compiled.body.is_empty() {
                rules.unconditional.push(index);
            }
            for (position, atom) in compiled.body.iter().enumerate() {
                match atom {
                    BodyAtom::Node(_) => rules.by_node.push((index, position)),
                    BodyAtom::Concept(concept, _) => {
                        rules.by_concept.entry(concept.clone()).or_default().push((index, position))
                    }
                    BodyAtom::Role(role, _, _) => rules.by_role.entry(role.clone()).or_default().push((index, position)),
                }
            }
            rules.clauses.push(compiled);
        }
        rules
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Fire clauses with an empty body
    pub fn fire_unconditional(&self, graph: &mut Graph, store: &mut DisjunctionStore) -> Result<(), Clash> {
        for index in &self.unconditional {
            self.fire(&self.clauses[*index], &[], graph, store)?;
        }
        Ok(())
    }

    /// Join every body atom matching `fact` against the graph and fire the heads
    pub fn process_fact(&self, fact: &Fact, graph: &mut Graph, store: &mut DisjunctionStore) -> Result<(), Clash> {
        if !still_holds(fact, graph) {
            return Ok(());
        }

        let triggers: &[(usize, usize)] = match fact {
            Fact::Node(_) => &self.by_node,
            Fact::Concept(_, concept) => self.by_concept.get(concept).map(Vec::as_slice).unwrap_or_default(),
            Fact::Role(role, _, _) => self.by_role.get(role).map(Vec::as_slice).unwrap_or_default(),
        };

        for (index, position) in triggers {
            let clause = &self.clauses[*index];
            let matches = self.matches(clause, *position, fact, graph);

            for values in matches {
                if values.iter().any(|node| graph.is_indirectly_blocked(*node)) {
                    continue;
                }
                self.fire(clause, &values, graph, store)?;
            }
        }
        Ok(())
    }

    fn matches(&self, clause: &CompiledClause, position: usize, fact: &Fact, graph: &Graph) -> Vec<Vec<NodeId>> {
        let mut bindings: Bindings = vec![None; clause.variables];
        let mut found = Vec::new();

        if !unify(&clause.body[position], fact, &mut bindings, graph) {
            return found;
        }
        let mut remaining: Vec<usize> = (0..clause.body.len()).filter(|atom| *atom != position).collect();
        join(clause, &mut remaining, &mut bindings, graph, &mut found);
        found
    }

    fn fire(
        &self,
        clause: &CompiledClause,
        values: &[NodeId],
        graph: &mut Graph,
        store: &mut DisjunctionStore,
    ) -> Result<(), Clash> {
        if clause.head.is_empty() {
            return Err(ClashReason::EmptyHead(clause.source.clone()).into());
        }
        trace!(clause = %clause.source, bindings = ?values, "clause fired");

        let disjuncts: Vec<GroundDisjunct> = clause.head.iter().map(|atom| ground(atom, values, graph)).collect();
        if clause.disjunctive {
            add_disjunction(graph, store, disjuncts)?;
        } else {
            for disjunct in disjuncts {
                disjunct.derive(graph)?;
            }
        }
        Ok(())
    }
}

/// Record a ground disjunction unless it is already satisfied.
///
/// Refuted and duplicate disjuncts are dropped; a single survivor is
/// derived directly and none left is a clash.
pub fn add_disjunction(
    graph: &mut Graph,
    store: &mut DisjunctionStore,
    disjuncts: Vec<GroundDisjunct>,
) -> Result<Option<DisjunctionId>, Clash> {
    let mut alternatives: Vec<GroundDisjunct> = Vec::with_capacity(disjuncts.len());
    for disjunct in &disjuncts {
        let disjunct = disjunct.resolve(graph);
        if disjunct.holds(graph) {
            return Ok(None);
        }
        if disjunct.is_refuted(graph) || alternatives.contains(&disjunct) {
            continue;
        }
        alternatives.push(disjunct);
    }

    match alternatives.len() {
        0 => Err(ClashReason::RefutedDisjunction(disjuncts.iter().join(" v ")).into()),
        1 => {
            alternatives[0].derive(graph)?;
            Ok(None)
        }
        _ => Ok(Some(store.add(alternatives))),
    }
}

fn compile_clause(clause: &DLClause, graph: &mut Graph) -> CompiledClause {
    let mut variables: Vec<String> = Vec::new();
    let mut slot = |term: &Term, graph: &mut Graph| -> Slot {
        match term {
            Term::Individual(individual) => Slot::Constant(graph.create_root(individual)),
            Term::Variable(name) => match variables.iter().position(|variable| variable == name) {
                Some(index) => Slot::Variable(index),
                None => {
                    variables.push(name.clone());
                    Slot::Variable(variables.len() - 1)
                }
            },
        }
    };

    let mut body = Vec::with_capacity(clause.body.len());
    for atom in &clause.body {
        let arguments: Vec<Slot> = atom.arguments.iter().map(|term| slot(term, graph)).collect();
        let compiled = match (&atom.predicate, arguments.as_slice()) {
            (DLPredicate::Concept(Concept::Thing), [node]) => BodyAtom::Node(*node),
            (DLPredicate::Concept(concept), [node]) => BodyAtom::Concept(concept.clone(), *node),
            (DLPredicate::Role(Role::Atomic(name)), [from, to]) => BodyAtom::Role(name.clone(), *from, *to),
            (DLPredicate::Role(Role::Inverse(name)), [from, to]) => BodyAtom::Role(name.clone(), *to, *from),
            // rejected by validation
            _ => continue,
        };
        body.push(compiled);
    }

    let head = clause
        .head
        .atoms()
        .iter()
        .map(|atom| HeadAtom {
            predicate: atom.predicate.clone(),
            arguments: atom.arguments.iter().map(|term| slot(term, graph)).collect(),
        })
        .collect();

    CompiledClause {
        source: clause.to_string(),
        body,
        head,
        disjunctive: clause.head.is_disjunctive(),
        variables: variables.len(),
    }
}

fn still_holds(fact: &Fact, graph: &Graph) -> bool {
    match fact {
        Fact::Node(node) => graph.is_live(*node),
        Fact::Concept(node, concept) => graph.is_live(*node) && graph.has_concept(*node, concept),
        Fact::Role(role, from, to) => graph.is_live(*from) && graph.is_live(*to) && graph.has_atomic_role(role, *from, *to),
    }
}

fn value(slot: Slot, bindings: &Bindings, graph: &Graph) -> Option<NodeId> {
    match slot {
        Slot::Variable(index) => bindings[index],
        Slot::Constant(node) => Some(graph.find(node)),
    }
}

/// Bind a slot to a node: `None` on conflict, `Some(true)` if newly bound
fn bind(slot: Slot, node: NodeId, bindings: &mut Bindings, graph: &Graph) -> Option<bool> {
    match slot {
        Slot::Constant(constant) => (graph.find(constant) == node).then_some(false),
        Slot::Variable(index) => match bindings[index] {
            Some(bound) => (bound == node).then_some(false),
            None => {
                bindings[index] = Some(node);
                Some(true)
            }
        },
    }
}

fn unbind(slot: Slot, newly_bound: bool, bindings: &mut Bindings) {
    if let (Slot::Variable(index), true) = (slot, newly_bound) {
        bindings[index] = None;
    }
}

fn unify(atom: &BodyAtom, fact: &Fact, bindings: &mut Bindings, graph: &Graph) -> bool {
    match (atom, fact) {
        (BodyAtom::Node(slot), Fact::Node(node)) | (BodyAtom::Concept(_, slot), Fact::Concept(node, _)) => {
            bind(*slot, *node, bindings, graph).is_some()
        }
        (BodyAtom::Role(_, from_slot, to_slot), Fact::Role(_, from, to)) => {
            bind(*from_slot, *from, bindings, graph).is_some() && bind(*to_slot, *to, bindings, graph).is_some()
        }
        _ => false,
    }
}

/// Depth-first join; the next atom is the one with the most bound slots
fn join(
    clause: &CompiledClause,
    remaining: &mut Vec<usize>,
    bindings: &mut Bindings,
    graph: &Graph,
    found: &mut Vec<Vec<NodeId>>,
) {
    if remaining.is_empty() {
        let values: Vec<NodeId> = bindings.iter().flatten().copied().collect();
        if values.len() == clause.variables {
            found.push(values);
        }
        return;
    }

    let Some(choice) = (0..remaining.len()).max_by_key(|choice| {
        let bound = clause.body[remaining[*choice]]
            .slots()
            .into_iter()
            .filter(|slot| value(*slot, bindings, graph).is_some())
            .count();
        // ties go to the earliest atom
        (bound, std::cmp::Reverse(*choice))
    }) else {
        return;
    };
    let atom_index = remaining.remove(choice);
    let atom = &clause.body[atom_index];

    match atom {
        BodyAtom::Node(slot) => match value(*slot, bindings, graph) {
            Some(node) => {
                if graph.is_live(node) {
                    join(clause, remaining, bindings, graph, found);
                }
            }
            None => {
                let candidates: Vec<NodeId> = graph.live_nodes().map(|node| node.id()).collect();
                extend_one(clause, *slot, candidates, remaining, bindings, graph, found);
            }
        },
        BodyAtom::Concept(concept, slot) => match value(*slot, bindings, graph) {
            Some(node) => {
                if graph.has_concept(node, concept) {
                    join(clause, remaining, bindings, graph, found);
                }
            }
            None => {
                let candidates: Vec<NodeId> = graph.nodes_with_concept(concept).collect();
                extend_one(clause, *slot, candidates, remaining, bindings, graph, found);
            }
        },
        BodyAtom::Role(role, from_slot, to_slot) => {
            match (value(*from_slot, bindings, graph), value(*to_slot, bindings, graph)) {
                (Some(from), Some(to)) => {
                    if graph.has_atomic_role(role, from, to) {
                        join(clause, remaining, bindings, graph, found);
                    }
                }
                (Some(from), None) => {
                    let candidates: Vec<NodeId> = graph.successors(from, role).collect();
                    extend_one(clause, *to_slot, candidates, remaining, bindings, graph, found);
                }
                (None, Some(to)) => {
                    let candidates: Vec<NodeId> = graph.predecessors(to, role).collect();
                    extend_one(clause, *from_slot, candidates, remaining, bindings, graph, found);
                }
                (None, None) => {
                    let pairs: Vec<(NodeId, NodeId)> = graph.role_pairs(role).collect();
                    for (from, to) in pairs {
                        let Some(first) = bind(*from_slot, from, bindings, graph) else {
                            continue;
                        };
                        if let Some(second) = bind(*to_slot, to, bindings, graph) {
                            join(clause, remaining, bindings, graph, found);
                            unbind(*to_slot, second, bindings);
                        }
                        unbind(*from_slot, first, bindings);
                    }
                }
            }
        }
    }

    remaining.insert(choice, atom_index);
}

fn extend_one(
    clause: &CompiledClause,
    slot: Slot,
    candidates: Vec<NodeId>,
    remaining: &mut Vec<usize>,
    bindings: &mut Bindings,
    graph: &Graph,
    found: &mut Vec<Vec<NodeId>>,
) {
    for node in candidates {
        if let Some(newly_bound) = bind(slot, node, bindings, graph) {
            join(clause, remaining, bindings, graph, found);
            unbind(slot, newly_bound, bindings);
        }
    }
}

fn ground(atom: &HeadAtom, values: &[NodeId], graph: &Graph) -> GroundDisjunct {
    let arguments = atom
        .arguments
        .iter()
        .map(|slot| match slot {
            Slot::Variable(index) => graph.find(values[*index]),
            Slot::Constant(node) => graph.find(*node),
        })
        .collect();
    GroundDisjunct::new(atom.predicate.clone(), arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypertab_model::parse_knowledge_base;

    fn saturate(rules: &RuleSet, graph: &mut Graph, store: &mut DisjunctionStore) -> Result<(), Clash> {
        rules.fire_unconditional(graph, store)?;
        loop {
            let fresh = graph.take_fresh();
            if fresh.is_empty() {
                return Ok(());
            }
            for fact in fresh {
                rules.process_fact(&fact, graph, store)?;
            }
        }
    }

    #[test]
    fn test_join_over_role_chain() {
        let kb = parse_knowledge_base("A(x), R(x,y), R(y,z) -> B(z).").unwrap();
        let mut graph = Graph::new();
        let rules = RuleSet::compile(&kb, &mut graph);
        let mut store = DisjunctionStore::new();

        let x = graph.create_node(None);
        let y = graph.create_node(None);
        let z = graph.create_node(None);
        graph.add_atomic_role("R", y, z);
        graph.add_atomic_role("R", x, y);
        graph.add_concept(x, Concept::atomic("A")).unwrap();
        saturate(&rules, &mut graph, &mut store).unwrap();

        assert!(graph.has_concept(z, &Concept::atomic("B")));
        assert!(!graph.has_concept(y, &Concept::atomic("B")));
    }

    #[test]
    fn test_inverse_role_in_body() {
        let kb = parse_knowledge_base("R-(x,y), A(y) -> B(x).").unwrap();
        let mut graph = Graph::new();
        let rules = RuleSet::compile(&kb, &mut graph);
        let mut store = DisjunctionStore::new();

        let x = graph.create_node(None);
        let y = graph.create_node(None);
        graph.add_atomic_role("R", y, x);
        graph.add_concept(y, Concept::atomic("A")).unwrap();
        saturate(&rules, &mut graph, &mut store).unwrap();

        assert!(graph.has_concept(x, &Concept::atomic("B")));
    }

    #[test]
    fn test_disjunctive_head_is_queued() {
        let kb = parse_knowledge_base("A(x) -> B(x) | C(x).").unwrap();
        let mut graph = Graph::new();
        let rules = RuleSet::compile(&kb, &mut graph);
        let mut store = DisjunctionStore::new();

        let x = graph.create_node(None);
        graph.add_concept(x, Concept::atomic("A")).unwrap();
        saturate(&rules, &mut graph, &mut store).unwrap();

        assert_eq!(store.unprocessed_count(), 1);
        let (_, disjunction) = store.unprocessed().next().unwrap();
        assert_eq!(disjunction.to_string(), "B(0) v C(0)");
    }

    #[test]
    fn test_satisfied_and_refuted_disjuncts_are_pruned() {
        let kb = parse_knowledge_base("A(x) -> B(x) | C(x).\nD(x) -> !B(x) | E(x) | E(x).").unwrap();
        let mut graph = Graph::new();
        let rules = RuleSet::compile(&kb, &mut graph);
        let mut store = DisjunctionStore::new();

        let x = graph.create_node(None);
        graph.add_concept(x, Concept::atomic("C")).unwrap();
        graph.add_concept(x, Concept::atomic("A")).unwrap();
        let y = graph.create_node(None);
        graph.add_concept(y, Concept::atomic("B")).unwrap();
        graph.add_concept(y, Concept::atomic("D")).unwrap();
        saturate(&rules, &mut graph, &mut store).unwrap();

        assert_eq!(store.unprocessed_count(), 0);
        assert!(graph.has_concept(y, &Concept::atomic("E")));
    }

    #[test]
    fn test_empty_head_clashes() {
        let kb = parse_knowledge_base("A(x), B(x) -> false.").unwrap();
        let mut graph = Graph::new();
        let rules = RuleSet::compile(&kb, &mut graph);
        let mut store = DisjunctionStore::new();

        let x = graph.create_node(None);
        graph.add_concept(x, Concept::atomic("A")).unwrap();
        graph.add_concept(x, Concept::atomic("B")).unwrap();
        let clash = saturate(&rules, &mut graph, &mut store).unwrap_err();
        assert!(matches!(clash.reason, ClashReason::EmptyHead(_)));
    }

    #[test]
    fn test_equality_head_merges() {
        let kb = parse_knowledge_base("R(x,y1), R(x,y2) -> y1 == y2.").unwrap();
        let mut graph = Graph::new();
        let rules = RuleSet::compile(&kb, &mut graph);
        let mut store = DisjunctionStore::new();

        let x = graph.create_node(None);
        let y1 = graph.create_node(Some(x));
        let y2 = graph.create_node(Some(x));
        graph.add_atomic_role("R", x, y1);
        graph.add_atomic_role("R", x, y2);
        saturate(&rules, &mut graph, &mut store).unwrap();

        assert_eq!(graph.find(y2), y1);
        assert_eq!(graph.successors(x, "R").count(), 1);
    }

    #[test]
    fn test_constants_resolve_to_roots() {
        let kb = parse_knowledge_base("A(x) -> R(x,'hub').\nR(x,'hub') -> B(x).").unwrap();
        let mut graph = Graph::new();
        let rules = RuleSet::compile(&kb, &mut graph);
        let mut store = DisjunctionStore::new();
        let hub = graph.root(&hypertab_model::Individual::new("hub")).unwrap();

        let x = graph.create_node(None);
        graph.add_concept(x, Concept::atomic("A")).unwrap();
        saturate(&rules, &mut graph, &mut store).unwrap();

        assert!(graph.has_atomic_role("R", x, hub));
        assert!(graph.has_concept(x, &Concept::atomic("B")));
        assert_eq!(rules.len(), 2);
    }
}
