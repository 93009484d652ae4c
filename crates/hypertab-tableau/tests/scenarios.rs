use anyhow::Result;
use hypertab_model::{parse_knowledge_base, Concept, Individual};
use hypertab_tableau::{
    BlockingCheckerKind, BlockingConfig, BlockingStrategyKind, ExpansionOrder, NodeId, NodeStatus, Tableau,
    TableauConfig, TableauError,
};
use std::sync::Arc;

fn tableau(source: &str) -> Result<Tableau> {
    tableau_with(source, TableauConfig::default())
}

fn tableau_with(source: &str, config: TableauConfig) -> Result<Tableau> {
    let knowledge_base = parse_knowledge_base(source)?;
    Ok(Tableau::new(Arc::new(knowledge_base), config)?)
}

fn blocking(strategy: BlockingStrategyKind, checker: BlockingCheckerKind) -> TableauConfig {
    TableauConfig {
        blocking: BlockingConfig { strategy, checker },
        ..TableauConfig::default()
    }
}

#[test]
fn test_empty_clause_set_is_satisfiable() -> Result<()> {
    let mut tableau = tableau("")?;

    assert!(tableau.is_satisfiable()?);
    assert!(tableau.nodes().is_empty());
    assert_eq!(tableau.statistics().clashes, 0);
    Ok(())
}

#[test]
fn test_complementary_facts_clash_without_choice_points() -> Result<()> {
    let mut tableau = tableau("P(x), !P(x) -> false. P('root'). !P('root').")?;

    assert!(!tableau.is_satisfiable()?);
    assert_eq!(tableau.statistics().branches, 0);
    assert_eq!(tableau.statistics().clashes, 1);
    Ok(())
}

#[test]
fn test_cyclic_existential_is_blocked() -> Result<()> {
    let mut tableau = tableau("C('root'). C(x) -> >=1 R.C(x).")?;

    assert!(tableau.is_satisfiable()?);
    assert_eq!(tableau.statistics().nodes_created, 2);

    let nodes = tableau.nodes();
    assert_eq!(nodes[1].status, NodeStatus::Blocked);
    assert_eq!(nodes[1].blocked_by, Some(NodeId(0)));
    assert_eq!(nodes[1].parent, Some(NodeId(0)));
    assert_eq!(nodes[0].edges, vec![("R".to_string(), NodeId(1))]);
    Ok(())
}

#[test]
fn test_cyclic_existential_terminates_under_every_blocking_variant() -> Result<()> {
    let source = "C('root'). C(x) -> >=1 R.D(x). D(x) -> >=1 S.C(x).";
    let variants = [
        (BlockingStrategyKind::Ancestor, BlockingCheckerKind::SingleSubset),
        (BlockingStrategyKind::Ancestor, BlockingCheckerKind::SingleEquality),
        (BlockingStrategyKind::Ancestor, BlockingCheckerKind::Pairwise),
        (BlockingStrategyKind::Anywhere, BlockingCheckerKind::SingleEquality),
        (BlockingStrategyKind::Anywhere, BlockingCheckerKind::Pairwise),
    ];

    for (strategy, checker) in variants {
        let mut tableau = tableau_with(source, blocking(strategy, checker))?;
        assert!(tableau.is_satisfiable()?, "{:?}/{:?}", strategy, checker);
        assert!(tableau.nodes().iter().any(|node| node.is_blocked()));
        assert!(tableau.statistics().nodes_created <= 6);
    }
    Ok(())
}

#[test]
fn test_disjunction_backtracks_to_second_alternative() -> Result<()> {
    let mut tableau = tableau("P(x), B(x) -> false. B('a'). P('a') | Q('a').")?;

    assert!(tableau.is_satisfiable()?);
    let statistics = tableau.statistics();
    assert_eq!(statistics.branches, 1);
    assert_eq!(statistics.backtracks, 1);
    assert_eq!(statistics.clashes, 1);

    let a = tableau.graph().root(&Individual::new("a")).expect("root for 'a'");
    assert!(tableau.graph().has_concept(a, &Concept::atomic("Q")));
    assert!(!tableau.graph().has_concept(a, &Concept::atomic("P")));
    // semantic branching records the refuted first alternative
    assert!(tableau.graph().has_concept(a, &Concept::negated("P")));
    assert!(tableau.unprocessed_disjunctions().is_empty());
    Ok(())
}

#[test]
fn test_all_alternatives_refuted_is_unsatisfiable() -> Result<()> {
    let mut tableau = tableau("P(x), B(x) -> false. Q(x), B(x) -> false. B('a'). P('a') | Q('a').")?;

    assert!(!tableau.is_satisfiable()?);
    assert_eq!(tableau.statistics().branches, 1);
    Ok(())
}

#[test]
fn test_merge_of_unequal_nodes_clashes() -> Result<()> {
    let mut tableau = tableau("R('a','b'). R('a','c'). 'b' != 'c'. R(x,y1), R(x,y2) -> y1 == y2.")?;

    assert!(!tableau.is_satisfiable()?);
    assert_eq!(tableau.statistics().branches, 0);
    Ok(())
}

#[test]
fn test_at_least_two_conflicts_with_at_most_one() -> Result<()> {
    let mut tableau = tableau("A('a'). A(x) -> >=2 R.B(x). R(x,y1), R(x,y2) -> y1 == y2.")?;

    assert!(!tableau.is_satisfiable()?);
    Ok(())
}

#[test]
fn test_equality_merges_into_older_individual() -> Result<()> {
    let mut tableau = tableau("R('a','b'). R('a','c'). B('c'). R(x,y1), R(x,y2) -> y1 == y2.")?;

    assert!(tableau.is_satisfiable()?);
    let graph = tableau.graph();
    let b = graph.root(&Individual::new("b")).expect("root for 'b'");
    assert_eq!(graph.root(&Individual::new("c")), Some(b));
    assert!(graph.has_concept(b, &Concept::atomic("B")));
    assert_eq!(tableau.statistics().merges, 1);
    Ok(())
}

#[test]
fn test_equality_disjunction_is_resolved_by_branching() -> Result<()> {
    let source = "A('a'). A(x) -> >=3 R.Thing(x). \
                  R(x,y1), R(x,y2), R(x,y3) -> y1 == y2 | y1 == y3 | y2 == y3.";
    let mut tableau = tableau(source)?;

    // three pairwise-unequal successors refute every disjunct
    assert!(!tableau.is_satisfiable()?);

    let mut tableau = tableau_with(
        "A('a'). A(x) -> >=2 R.Thing(x). R(x,y1), R(x,y2), R(x,y3) -> y1 == y2 | y1 == y3 | y2 == y3.",
        TableauConfig::default(),
    )?;
    assert!(tableau.is_satisfiable()?);
    Ok(())
}

#[test]
fn test_expansion_orders_agree() -> Result<()> {
    let source = "C('a'). C(x) -> >=1 R.D(x). D(x) -> E(x) | F(x). E(x) -> false. F(x) -> >=1 R.C(x).";
    let mut verdicts = Vec::new();

    for expansion in [ExpansionOrder::CreationOrder, ExpansionOrder::NewestFirst] {
        let config = TableauConfig {
            expansion,
            ..TableauConfig::default()
        };
        let mut tableau = tableau_with(source, config)?;
        verdicts.push(tableau.is_satisfiable()?);
    }
    assert_eq!(verdicts, vec![true, true]);
    Ok(())
}

#[test]
fn test_extra_facts_check() -> Result<()> {
    let mut tableau = tableau("A(x) -> B(x). B(x), C(x) -> false.")?;
    let facts = parse_knowledge_base("A('i'). C('i').")?.facts;

    assert!(tableau.is_satisfiable()?);
    assert!(!tableau.is_satisfiable_with(&facts)?);
    assert!(tableau.is_satisfiable_with(&facts[..1])?);
    Ok(())
}

#[test]
fn test_node_ceiling_is_resource_exhaustion() -> Result<()> {
    let config = TableauConfig {
        max_nodes: 3,
        ..TableauConfig::default()
    };
    let mut tableau = tableau_with("A('a'). A(x) -> >=5 R.B(x).", config)?;

    match tableau.is_satisfiable() {
        Err(TableauError::ResourceExhausted { resource, limit }) => {
            assert_eq!(resource, "nodes");
            assert_eq!(limit, 3);
        }
        other => panic!("expected resource exhaustion, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_malformed_knowledge_base_is_rejected() {
    let knowledge_base = hypertab_model::KnowledgeBase::new(
        vec![hypertab_model::DLClause::conjunctive(
            vec![hypertab_model::Atom::concept(
                Concept::atomic("A"),
                hypertab_model::Term::variable("x"),
            )],
            vec![hypertab_model::Atom::concept(
                Concept::atomic("B"),
                hypertab_model::Term::variable("y"),
            )],
        )],
        Vec::new(),
    );

    assert!(matches!(
        Tableau::new(Arc::new(knowledge_base), TableauConfig::default()),
        Err(TableauError::MalformedInput(_))
    ));
}

#[test]
fn test_unsound_blocking_combination_is_rejected() {
    let result = tableau_with(
        "",
        blocking(BlockingStrategyKind::Anywhere, BlockingCheckerKind::SingleSubset),
    );
    assert!(result.is_err());
}
