//! DL 節データモデル

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Named individual (ABox constant)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Individual(pub String);

impl Individual {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0)
    }
}

/// Role (binary predicate), possibly inverse
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// R
    Atomic(String),
    /// R⁻
    Inverse(String),
}

impl Role {
    pub fn atomic(name: impl Into<String>) -> Self {
        Role::Atomic(name.into())
    }

    pub fn inverse(name: impl Into<String>) -> Self {
        Role::Inverse(name.into())
    }

    /// Name of the underlying atomic role
    pub fn name(&self) -> &str {
        match self {
            Role::Atomic(name) | Role::Inverse(name) => name,
        }
    }

    pub fn is_inverse(&self) -> bool {
        matches!(self, Role::Inverse(_))
    }

    /// R ↦ R⁻, R⁻ ↦ R
    pub fn inverse_of(&self) -> Role {
        match self {
            Role::Atomic(name) => Role::Inverse(name.clone()),
            Role::Inverse(name) => Role::Atomic(name.clone()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Atomic(name) => write!(f, "{}", name),
            Role::Inverse(name) => write!(f, "{}-", name),
        }
    }
}

/// Unary predicate that may appear in a node label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    /// ⊤: holds for every node and is never stored in a label
    Thing,
    /// ⊥: deriving it for any node is a clash
    Nothing,
    /// A
    Atomic(String),
    /// ¬A
    Negated(String),
    /// ≥ n R.C
    AtLeast(AtLeast),
}

/// Existential requirement ≥ n R.C
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AtLeast {
    pub number: u32,
    pub role: Role,
    pub filler: Box<Concept>,
}

impl Concept {
    pub fn atomic(name: impl Into<String>) -> Self {
        Concept::Atomic(name.into())
    }

    pub fn negated(name: impl Into<String>) -> Self {
        Concept::Negated(name.into())
    }

    pub fn at_least(number: u32, role: Role, filler: Concept) -> Self {
        Concept::AtLeast(AtLeast {
            number,
            role,
            filler: Box::new(filler),
        })
    }

    /// ∃R.C, i.e. ≥ 1 R.C
    pub fn some(role: Role, filler: Concept) -> Self {
        Self::at_least(1, role, filler)
    }

    /// Literal concepts are the only legal at-least fillers
    pub fn is_literal(&self) -> bool {
        !matches!(self, Concept::AtLeast(_))
    }

    /// Complementary literal, if this concept has one
    pub fn complement(&self) -> Option<Concept> {
        match self {
            Concept::Thing => Some(Concept::Nothing),
            Concept::Nothing => Some(Concept::Thing),
            Concept::Atomic(name) => Some(Concept::Negated(name.clone())),
            Concept::Negated(name) => Some(Concept::Atomic(name.clone())),
            Concept::AtLeast(_) => None,
        }
    }

    /// Roles mentioned by this concept
    pub fn role(&self) -> Option<&Role> {
        match self {
            Concept::AtLeast(at_least) => Some(&at_least.role),
            _ => None,
        }
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concept::Thing => write!(f, "Thing"),
            Concept::Nothing => write!(f, "Nothing"),
            Concept::Atomic(name) => write!(f, "{}", name),
            Concept::Negated(name) => write!(f, "!{}", name),
            Concept::AtLeast(at_least) => write!(f, "{}", at_least),
        }
    }
}

impl fmt::Display for AtLeast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">={} {}.{}", self.number, self.role, self.filler)
    }
}

/// Predicate of an atom. Equality is a first-class variant whose
/// derivation merges nodes instead of adding a label or an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DLPredicate {
    Concept(Concept),
    Role(Role),
    Equality,
    Inequality,
}

impl DLPredicate {
    pub fn arity(&self) -> usize {
        match self {
            DLPredicate::Concept(_) => 1,
            DLPredicate::Role(_) | DLPredicate::Equality | DLPredicate::Inequality => 2,
        }
    }
}

impl fmt::Display for DLPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DLPredicate::Concept(concept) => write!(f, "{}", concept),
            DLPredicate::Role(role) => write!(f, "{}", role),
            DLPredicate::Equality => write!(f, "=="),
            DLPredicate::Inequality => write!(f, "!="),
        }
    }
}

/// Clause argument
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Variable(String),
    Individual(Individual),
}

impl Term {
    pub fn variable(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    pub fn individual(name: impl Into<String>) -> Self {
        Term::Individual(Individual::new(name))
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(name) => Some(name),
            Term::Individual(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "{}", name),
            Term::Individual(individual) => write!(f, "{}", individual),
        }
    }
}

/// Predicate applied to clause terms
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub predicate: DLPredicate,
    pub arguments: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: DLPredicate, arguments: Vec<Term>) -> Self {
        Self { predicate, arguments }
    }

    pub fn concept(concept: Concept, argument: Term) -> Self {
        Self::new(DLPredicate::Concept(concept), vec![argument])
    }

    pub fn role(role: Role, from: Term, to: Term) -> Self {
        Self::new(DLPredicate::Role(role), vec![from, to])
    }

    pub fn equality(left: Term, right: Term) -> Self {
        Self::new(DLPredicate::Equality, vec![left, right])
    }

    pub fn inequality(left: Term, right: Term) -> Self {
        Self::new(DLPredicate::Inequality, vec![left, right])
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(Term::as_variable)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_atom(f, &self.predicate, &self.arguments)
    }
}

/// Predicate applied to individuals
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundAtom {
    pub predicate: DLPredicate,
    pub arguments: Vec<Individual>,
}

impl GroundAtom {
    pub fn new(predicate: DLPredicate, arguments: Vec<Individual>) -> Self {
        Self { predicate, arguments }
    }

    pub fn concept(concept: Concept, individual: Individual) -> Self {
        Self::new(DLPredicate::Concept(concept), vec![individual])
    }

    pub fn role(role: Role, from: Individual, to: Individual) -> Self {
        Self::new(DLPredicate::Role(role), vec![from, to])
    }

    pub fn equality(left: Individual, right: Individual) -> Self {
        Self::new(DLPredicate::Equality, vec![left, right])
    }

    pub fn inequality(left: Individual, right: Individual) -> Self {
        Self::new(DLPredicate::Inequality, vec![left, right])
    }
}

impl fmt::Display for GroundAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_atom(f, &self.predicate, &self.arguments)
    }
}

fn write_atom<T: fmt::Display>(f: &mut fmt::Formatter<'_>, predicate: &DLPredicate, arguments: &[T]) -> fmt::Result {
    match (predicate, arguments) {
        (DLPredicate::Equality, [left, right]) => write!(f, "{} == {}", left, right),
        (DLPredicate::Inequality, [left, right]) => write!(f, "{} != {}", left, right),
        _ => write!(f, "{}({})", predicate, arguments.iter().join(",")),
    }
}

/// Clause head: a conjunction (all atoms derived) or a disjunction
/// (at least one atom holds). Empty heads of either kind denote ⊥.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseHead {
    Conjunction(Vec<Atom>),
    Disjunction(Vec<Atom>),
}

impl ClauseHead {
    pub fn atoms(&self) -> &[Atom] {
        match self {
            ClauseHead::Conjunction(atoms) | ClauseHead::Disjunction(atoms) => atoms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.atoms().is_empty()
    }

    /// True when more than one alternative exists
    pub fn is_disjunctive(&self) -> bool {
        matches!(self, ClauseHead::Disjunction(atoms) if atoms.len() > 1)
    }
}

impl fmt::Display for ClauseHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            head if head.is_empty() => write!(f, "false"),
            ClauseHead::Conjunction(atoms) => write!(f, "{}", atoms.iter().join(", ")),
            ClauseHead::Disjunction(atoms) => write!(f, "{}", atoms.iter().join(" | ")),
        }
    }
}

/// Horn-style implication body → head
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DLClause {
    pub body: Vec<Atom>,
    pub head: ClauseHead,
}

impl DLClause {
    pub fn new(body: Vec<Atom>, head: ClauseHead) -> Self {
        Self { body, head }
    }

    pub fn conjunctive(body: Vec<Atom>, head: Vec<Atom>) -> Self {
        Self::new(body, ClauseHead::Conjunction(head))
    }

    pub fn disjunctive(body: Vec<Atom>, head: Vec<Atom>) -> Self {
        Self::new(body, ClauseHead::Disjunction(head))
    }

    /// body → ⊥
    pub fn contradiction(body: Vec<Atom>) -> Self {
        Self::new(body, ClauseHead::Conjunction(Vec::new()))
    }

    pub fn body_variables(&self) -> BTreeSet<&str> {
        self.body.iter().flat_map(Atom::variables).collect()
    }

    fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.body.iter().chain(self.head.atoms())
    }
}

impl fmt::Display for DLClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.body.is_empty() {
            write!(f, "-> {}", self.head)
        } else {
            write!(f, "{} -> {}", self.body.iter().join(", "), self.head)
        }
    }
}

/// Ground disjunctive fact; a single disjunct is a plain assertion
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundFact {
    pub disjuncts: Vec<GroundAtom>,
}

impl GroundFact {
    pub fn disjunction(disjuncts: Vec<GroundAtom>) -> Self {
        Self { disjuncts }
    }

    pub fn individuals(&self) -> impl Iterator<Item = &Individual> {
        self.disjuncts.iter().flat_map(|atom| atom.arguments.iter())
    }
}

impl From<GroundAtom> for GroundFact {
    fn from(atom: GroundAtom) -> Self {
        Self { disjuncts: vec![atom] }
    }
}

impl fmt::Display for GroundFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.disjuncts.iter().join(" | "))
    }
}

/// Language features present in a knowledge base. Blocking and expansion
/// pick cheaper variants when a feature is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseFlags {
    pub has_inverse_roles: bool,
    pub has_at_most_restrictions: bool,
    pub has_nominals: bool,
}

impl KnowledgeBaseFlags {
    /// True when every feature present in `other` is also reported here
    pub fn covers(&self, other: &KnowledgeBaseFlags) -> bool {
        (self.has_inverse_roles || !other.has_inverse_roles)
            && (self.has_at_most_restrictions || !other.has_at_most_restrictions)
            && (self.has_nominals || !other.has_nominals)
    }
}

/// Clausified knowledge base consumed by the tableau
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub clauses: Vec<DLClause>,
    #[serde(default)]
    pub facts: Vec<GroundFact>,
    /// Supplied flags; computed from the clauses when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<KnowledgeBaseFlags>,
}

impl KnowledgeBase {
    pub fn new(clauses: Vec<DLClause>, facts: Vec<GroundFact>) -> Self {
        Self {
            clauses,
            facts,
            flags: None,
        }
    }

    pub fn with_flags(mut self, flags: KnowledgeBaseFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn add_clause(&mut self, clause: DLClause) {
        self.clauses.push(clause);
    }

    pub fn add_fact(&mut self, fact: impl Into<GroundFact>) {
        self.facts.push(fact.into());
    }

    /// Effective flags
    pub fn flags(&self) -> KnowledgeBaseFlags {
        self.flags.unwrap_or_else(|| self.compute_flags())
    }

    /// Scan the clauses for inverse roles, equality heads and constants
    pub fn compute_flags(&self) -> KnowledgeBaseFlags {
        let mut flags = KnowledgeBaseFlags::default();

        for clause in &self.clauses {
            for atom in clause.atoms() {
                match &atom.predicate {
                    DLPredicate::Role(role) if role.is_inverse() => flags.has_inverse_roles = true,
                    DLPredicate::Concept(concept) => {
                        if concept.role().is_some_and(Role::is_inverse) {
                            flags.has_inverse_roles = true;
                        }
                    }
                    _ => {}
                }
                if atom.arguments.iter().any(|term| matches!(term, Term::Individual(_))) {
                    flags.has_nominals = true;
                }
            }
            // at-most restrictions clausify into equality heads
            if clause.head.atoms().iter().any(|atom| atom.predicate == DLPredicate::Equality) {
                flags.has_at_most_restrictions = true;
            }
        }

        for fact in &self.facts {
            for atom in &fact.disjuncts {
                if let DLPredicate::Concept(concept) = &atom.predicate {
                    if concept.role().is_some_and(Role::is_inverse) {
                        flags.has_inverse_roles = true;
                    }
                }
            }
        }

        flags
    }

    /// Individuals in order of first appearance: facts first, then clause constants
    pub fn individuals(&self) -> Vec<Individual> {
        let mut seen = BTreeSet::new();
        let mut individuals = Vec::new();

        let from_facts = self.facts.iter().flat_map(GroundFact::individuals);
        let from_clauses = self
            .clauses
            .iter()
            .flat_map(DLClause::atoms)
            .flat_map(|atom| atom.arguments.iter())
            .filter_map(|term| match term {
                Term::Individual(individual) => Some(individual),
                Term::Variable(_) => None,
            });

        for individual in from_facts.chain(from_clauses) {
            if seen.insert(individual.clone()) {
                individuals.push(individual.clone());
            }
        }
        individuals
    }
}
