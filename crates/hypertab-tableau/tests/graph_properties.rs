use hypertab_model::{Concept, Role};
use hypertab_tableau::{ClashReason, Graph, NodeId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    CreateChild(usize),
    AddConcept(usize, Concept),
    AddRole(&'static str, usize, usize),
    AddInequality(usize, usize),
    Merge(usize, usize),
}

fn concept() -> impl Strategy<Value = Concept> {
    prop_oneof![
        prop::sample::select(vec!["A", "B", "C"]).prop_map(Concept::atomic),
        prop::sample::select(vec!["A", "B"]).prop_map(Concept::negated),
        (1..3u32, prop::sample::select(vec!["R", "S"]))
            .prop_map(|(number, role)| Concept::at_least(number, Role::atomic(role), Concept::atomic("A"))),
    ]
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        any::<usize>().prop_map(Operation::CreateChild),
        (any::<usize>(), concept()).prop_map(|(node, concept)| Operation::AddConcept(node, concept)),
        (prop::sample::select(vec!["R", "S"]), any::<usize>(), any::<usize>())
            .prop_map(|(role, from, to)| Operation::AddRole(role, from, to)),
        (any::<usize>(), any::<usize>()).prop_map(|(left, right)| Operation::AddInequality(left, right)),
        (any::<usize>(), any::<usize>()).prop_map(|(left, right)| Operation::Merge(left, right)),
    ]
}

fn pick(graph: &Graph, index: usize) -> NodeId {
    NodeId((index % graph.created()) as u32)
}

/// Apply an operation; clashes leave the logged partial state in place
fn apply(graph: &mut Graph, operation: &Operation) {
    match operation {
        Operation::CreateChild(parent) => {
            let parent = graph.find(pick(graph, *parent));
            let child = graph.create_node(Some(parent));
            graph.add_atomic_role("R", parent, child);
        }
        Operation::AddConcept(node, concept) => {
            let node = pick(graph, *node);
            let _ = graph.add_concept(node, concept.clone());
        }
        Operation::AddRole(role, from, to) => {
            let (from, to) = (pick(graph, *from), pick(graph, *to));
            graph.add_atomic_role(role, from, to);
        }
        Operation::AddInequality(left, right) => {
            let (left, right) = (pick(graph, *left), pick(graph, *right));
            let _ = graph.add_inequality(left, right);
        }
        Operation::Merge(left, right) => {
            let (left, right) = (pick(graph, *left), pick(graph, *right));
            let _ = graph.merge(left, right);
        }
    }
}

fn build(operations: &[Operation]) -> Graph {
    let mut graph = Graph::new();
    graph.create_node(None);
    graph.create_node(None);
    for operation in operations {
        apply(&mut graph, operation);
    }
    graph
}

proptest! {
    #[test]
    fn prop_adding_twice_is_not_new(operations in prop::collection::vec(operation(), 0..20), concept in concept()) {
        let mut graph = build(&operations);
        let node = graph.find(NodeId(0));
        let role_target = graph.find(NodeId(1));

        if graph.add_concept(node, concept.clone()).is_ok() {
            prop_assert_eq!(graph.add_concept(node, concept.clone()), Ok(false));
            prop_assert!(graph.has_concept(node, &concept));
        }

        graph.add_atomic_role("T", node, role_target);
        prop_assert!(!graph.add_atomic_role("T", node, role_target));
        prop_assert!(graph.has_atomic_role("T", node, role_target));
    }

    #[test]
    fn prop_undo_restores_snapshot(
        before in prop::collection::vec(operation(), 0..15),
        after in prop::collection::vec(operation(), 1..25),
    ) {
        let mut graph = build(&before);
        let checkpoint = graph.checkpoint();
        let snapshot = graph.snapshot();
        let live = graph.live_count();

        for operation in &after {
            apply(&mut graph, operation);
        }
        graph.undo_to(checkpoint);

        prop_assert_eq!(graph.snapshot(), snapshot);
        prop_assert_eq!(graph.live_count(), live);
        prop_assert_eq!(graph.checkpoint(), checkpoint);
    }

    #[test]
    fn prop_merge_is_order_independent(
        operations in prop::collection::vec(operation(), 0..20),
        left in any::<usize>(),
        right in any::<usize>(),
    ) {
        let mut forward = build(&operations);
        let mut backward = build(&operations);
        let (left, right) = (pick(&forward, left), pick(&forward, right));

        let first = forward.merge(left, right);
        let second = backward.merge(right, left);
        prop_assert_eq!(first.is_ok(), second.is_ok());

        if first.is_ok() {
            prop_assert_eq!(forward.find(left), backward.find(left));
            prop_assert_eq!(forward.find(right), backward.find(right));
            prop_assert_eq!(forward.snapshot(), backward.snapshot());
            // merging again is a no-op
            prop_assert_eq!(forward.merge(right, left), Ok(false));
        }
    }
}

#[test]
fn test_merge_of_unequal_nodes_is_a_clash() {
    let mut graph = Graph::new();
    let left = graph.create_node(None);
    let right = graph.create_node(None);
    graph.add_inequality(left, right).unwrap();

    let clash = graph.merge(left, right).unwrap_err();
    assert_eq!(clash.reason, ClashReason::MergeOfUnequal { left, right });
}

#[test]
fn test_survivor_is_the_older_node() {
    let mut graph = Graph::new();
    let root = graph.create_node(None);
    let child = graph.create_node(Some(root));
    let grandchild = graph.create_node(Some(child));
    graph.add_atomic_role("R", root, child);
    graph.add_concept(child, Concept::atomic("A")).unwrap();

    assert_eq!(graph.merge(child, root), Ok(true));
    assert_eq!(graph.find(child), root);
    assert!(graph.has_concept(root, &Concept::atomic("A")));
    assert!(graph.has_atomic_role("R", root, root));
    assert_eq!(graph.node(grandchild).and_then(|node| node.parent()), Some(root));
}
