//! テーブルロー (オーケストレーター)
//!
//! グラフ、規則、ブロッキング、展開戦略、探索を所有し、
//! 飽和ループを実行して充足可能性を判定します。

use crate::blocking::{BlockingManager, DirectBlockingChecker, SignatureCache};
use crate::config::{BlockingCheckerKind, BlockingStrategyKind, CancellationToken, TableauConfig};
use crate::disjunction::{DisjunctionStore, GroundDisjunct};
use crate::expansion::{expand_existential, expansion_for, Agenda, AgendaItem, ExpansionStrategy};
use crate::graph::Graph;
use crate::rules::{self, RuleSet};
use crate::search::BacktrackingSearch;
use crate::{Clash, TableauError};
use hypertab_model::{Concept, DLPredicate, GroundFact, KnowledgeBase, KnowledgeBaseFlags};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Counters for one satisfiability check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableauStatistics {
    /// Saturation loop iterations
    pub steps: u64,
    pub nodes_created: u64,
    pub merges: u64,
    pub branches: u64,
    pub backtracks: u64,
    pub clashes: u64,
    pub max_live_nodes: u64,
}

/// Hypertableau decision procedure over a fixed clause set
pub struct Tableau {
    knowledge_base: Arc<KnowledgeBase>,
    config: TableauConfig,
    strategy_kind: BlockingStrategyKind,
    checker_kind: BlockingCheckerKind,
    pub(crate) graph: Graph,
    pub(crate) disjunctions: DisjunctionStore,
    rules: RuleSet,
    blocking: BlockingManager,
    expansion: Box<dyn ExpansionStrategy>,
    agenda: Agenda,
    search: BacktrackingSearch,
    statistics: TableauStatistics,
    cancellation: Option<CancellationToken>,
}

impl Tableau {
    /// Validate the knowledge base and resolve the configured strategies
    pub fn new(knowledge_base: Arc<KnowledgeBase>, config: TableauConfig) -> Result<Self, TableauError> {
        knowledge_base.validate()?;
        let (strategy_kind, checker_kind) = config.resolve_blocking(&knowledge_base.flags())?;

        debug!(
            clauses = knowledge_base.clauses.len(),
            facts = knowledge_base.facts.len(),
            strategy = ?strategy_kind,
            checker = ?checker_kind,
            expansion = ?config.expansion,
            "tableau created"
        );

        Ok(Self {
            blocking: BlockingManager::new(strategy_kind, checker_kind),
            expansion: expansion_for(config.expansion),
            search: BacktrackingSearch::new(config.semantic_branching),
            knowledge_base,
            config,
            strategy_kind,
            checker_kind,
            graph: Graph::new(),
            disjunctions: DisjunctionStore::new(),
            rules: RuleSet::default(),
            agenda: Agenda::new(),
            statistics: TableauStatistics::default(),
            cancellation: None,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &TableauConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }

    /// Blocking strategy and checker after `Auto` resolution, for the last
    /// check once one has run
    pub fn resolved_blocking(&self) -> (BlockingStrategyKind, BlockingCheckerKind) {
        (self.strategy_kind, self.checker_kind)
    }

    pub fn checker(&self) -> &dyn DirectBlockingChecker {
        self.blocking.checker()
    }

    /// Blocking signatures of the graph left by the last check
    pub fn signature_cache(&self) -> &SignatureCache {
        self.blocking.cache()
    }

    /// Statistics of the last check
    pub fn statistics(&self) -> &TableauStatistics {
        &self.statistics
    }

    /// Graph left by the last check
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Whether the knowledge base alone is satisfiable
    pub fn is_satisfiable(&mut self) -> Result<bool, TableauError> {
        self.is_satisfiable_with(&[])
    }

    /// Whether the knowledge base together with `facts` is satisfiable
    pub fn is_satisfiable_with(&mut self, facts: &[GroundFact]) -> Result<bool, TableauError> {
        KnowledgeBase::new(Vec::new(), facts.to_vec()).validate()?;
        self.prepare(facts)?;

        let started = Instant::now();
        info!(
            clauses = self.knowledge_base.clauses.len(),
            facts = self.knowledge_base.facts.len() + facts.len(),
            "satisfiability check started"
        );

        let pending = self.initialise(facts).err();
        let result = self.saturate(pending, started);

        self.statistics.nodes_created = self.graph.created() as u64;
        self.statistics.merges = self.graph.merge_count();

        match &result {
            Ok(satisfiable) => info!(
                satisfiable = *satisfiable,
                nodes = self.statistics.nodes_created,
                branches = self.statistics.branches,
                backtracks = self.statistics.backtracks,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "satisfiability check finished"
            ),
            Err(e) => info!(error = %e, steps = self.statistics.steps, "satisfiability check aborted"),
        }
        result
    }

    /// Reset per-check state. Blocking is resolved from the knowledge base
    /// and this check's extra facts only, so a stronger setup needed by one
    /// call does not carry over to the next.
    fn prepare(&mut self, facts: &[GroundFact]) -> Result<(), TableauError> {
        let extra = facts_flags(facts);
        let flags = self.knowledge_base.flags();
        let combined = KnowledgeBaseFlags {
            has_inverse_roles: flags.has_inverse_roles || extra.has_inverse_roles,
            has_at_most_restrictions: flags.has_at_most_restrictions || extra.has_at_most_restrictions,
            has_nominals: flags.has_nominals || extra.has_nominals,
        };
        let (strategy_kind, checker_kind) = self.config.resolve_blocking(&combined)?;
        self.strategy_kind = strategy_kind;
        self.checker_kind = checker_kind;

        self.graph = Graph::new();
        self.disjunctions = DisjunctionStore::new();
        self.blocking = BlockingManager::new(self.strategy_kind, self.checker_kind);
        self.agenda.clear();
        self.search.reset();
        self.statistics = TableauStatistics::default();
        Ok(())
    }

    /// Create roots, compile the clauses and assert the facts
    fn initialise(&mut self, facts: &[GroundFact]) -> Result<(), Clash> {
        let knowledge_base = Arc::clone(&self.knowledge_base);

        for individual in knowledge_base.individuals() {
            self.graph.create_root(&individual);
        }
        for individual in facts.iter().flat_map(GroundFact::individuals) {
            self.graph.create_root(individual);
        }

        self.rules = RuleSet::compile(&knowledge_base, &mut self.graph);
        self.rules.fire_unconditional(&mut self.graph, &mut self.disjunctions)?;

        for fact in knowledge_base.facts.iter().chain(facts) {
            self.assert_fact(fact)?;
        }
        Ok(())
    }

    fn assert_fact(&mut self, fact: &GroundFact) -> Result<(), Clash> {
        let mut disjuncts: Vec<GroundDisjunct> = fact
            .disjuncts
            .iter()
            .map(|atom| {
                let arguments = atom
                    .arguments
                    .iter()
                    .map(|individual| self.graph.create_root(individual))
                    .collect();
                GroundDisjunct::new(atom.predicate.clone(), arguments)
            })
            .collect();

        if disjuncts.len() == 1 {
            disjuncts.remove(0).derive(&mut self.graph)
        } else {
            rules::add_disjunction(&mut self.graph, &mut self.disjunctions, disjuncts).map(|_| ())
        }
    }

    fn check_limits(&self, started: Instant) -> Result<(), TableauError> {
        if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(TableauError::Cancelled);
        }
        if let Some(timeout) = self.config.timeout_ms {
            if started.elapsed().as_millis() as u64 >= timeout {
                return Err(TableauError::Timeout(timeout));
            }
        }
        if let Some(limit) = self.config.max_steps {
            if self.statistics.steps >= limit {
                return Err(TableauError::ResourceExhausted {
                    resource: "steps".to_string(),
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Run until saturation or until every branch has clashed
    fn saturate(&mut self, mut pending: Option<Clash>, started: Instant) -> Result<bool, TableauError> {
        loop {
            self.check_limits(started)?;
            self.statistics.steps += 1;
            self.statistics.max_live_nodes = self.statistics.max_live_nodes.max(self.graph.live_count() as u64);

            if let Some(clash) = pending.take() {
                self.statistics.clashes += 1;
                debug!(%clash, depth = self.search.depth(), "clash");
                if !self
                    .search
                    .backtrack(&mut self.graph, &mut self.disjunctions, &mut self.statistics)
                {
                    return Ok(false);
                }
                self.agenda.clear();
                self.blocking.invalidate();
                continue;
            }

            self.agenda.extend(self.graph.take_fresh());
            if self.agenda.is_empty() {
                for node in self.blocking.update(&mut self.graph) {
                    self.agenda.extend(self.graph.facts_of(node));
                }
            }

            let Some(item) = self.expansion.pick_next(&mut self.agenda, &mut self.graph, &self.disjunctions) else {
                return Ok(true);
            };

            pending = match item {
                AgendaItem::Fact(fact) => self
                    .rules
                    .process_fact(&fact, &mut self.graph, &mut self.disjunctions)
                    .err(),
                AgendaItem::Disjunction(id) => self
                    .search
                    .process(id, &mut self.graph, &mut self.disjunctions, &mut self.statistics)
                    .err(),
                AgendaItem::Existential { node, requirement } => {
                    let limit = self.config.max_nodes;
                    if self.graph.live_count() + requirement.number as usize > limit {
                        return Err(TableauError::ResourceExhausted {
                            resource: "nodes".to_string(),
                            limit: limit as u64,
                        });
                    }
                    expand_existential(&mut self.graph, node, &requirement).err()
                }
            };
        }
    }
}

/// Features introduced by extra facts
fn facts_flags(facts: &[GroundFact]) -> KnowledgeBaseFlags {
    let mut flags = KnowledgeBaseFlags::default();
    for atom in facts.iter().flat_map(|fact| fact.disjuncts.iter()) {
        match &atom.predicate {
            DLPredicate::Concept(Concept::AtLeast(at_least)) if at_least.role.is_inverse() => {
                flags.has_inverse_roles = true
            }
            DLPredicate::Equality => flags.has_at_most_restrictions = true,
            _ => {}
        }
    }
    flags
}
