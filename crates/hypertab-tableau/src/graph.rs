//! ノードグラフ
//!
//! 部分モデルを保持します: ノード、ラベル、多重ラベルエッジ、不等式、
//! マージ、そしてバックトラッキング用のアンドゥログ。
//! ノード間の参照はすべて `NodeId` で表し、所有参照は持ちません。

use crate::{Clash, ClashReason};
use hypertab_model::{Concept, Individual, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, trace};

/// Stable node identifier; assigned in creation order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable node status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Blocked,
    Merged,
    Pruned,
}

/// Blocking status maintained by the blocking strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingState {
    #[default]
    Unblocked,
    /// Blocked by a direct blocking check against the given node
    Direct(NodeId),
    /// Some ancestor is blocked
    Indirect,
}

impl BlockingState {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, BlockingState::Unblocked)
    }

    pub fn blocker(&self) -> Option<NodeId> {
        match self {
            BlockingState::Direct(blocker) => Some(*blocker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Live,
    Merged(NodeId),
    Pruned,
}

/// Node record in the arena
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    individual: Option<Individual>,
    parent: Option<NodeId>,
    children: BTreeSet<NodeId>,
    label: BTreeSet<Concept>,
    /// target → atomic role names
    outgoing: BTreeMap<NodeId, BTreeSet<String>>,
    /// source → atomic role names
    incoming: BTreeMap<NodeId, BTreeSet<String>>,
    unequal: BTreeSet<NodeId>,
    lifecycle: Lifecycle,
    blocking: BlockingState,
    /// Every at-least requirement in the label was found satisfied
    existentials_satisfied: bool,
    previous: Option<NodeId>,
    next: Option<NodeId>,
}

impl Node {
    fn new(id: NodeId, parent: Option<NodeId>, individual: Option<Individual>) -> Self {
        Self {
            id,
            individual,
            parent,
            children: BTreeSet::new(),
            label: BTreeSet::new(),
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
            unequal: BTreeSet::new(),
            lifecycle: Lifecycle::Live,
            blocking: BlockingState::Unblocked,
            existentials_satisfied: false,
            previous: None,
            next: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Named individual for root nodes
    pub fn individual(&self) -> Option<&Individual> {
        self.individual.as_ref()
    }

    /// Tree parent; `None` for root nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    pub fn label(&self) -> &BTreeSet<Concept> {
        &self.label
    }

    /// Outgoing edges as (role, target) pairs
    pub fn edges(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.outgoing
            .iter()
            .flat_map(|(target, roles)| roles.iter().map(move |role| (role.as_str(), *target)))
    }

    /// Role names on the edge from this node to `target`
    pub fn roles_to(&self, target: NodeId) -> Option<&BTreeSet<String>> {
        self.outgoing.get(&target)
    }

    pub fn unequal(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.unequal.iter().copied()
    }

    pub fn blocking(&self) -> BlockingState {
        self.blocking
    }

    /// Whether the node's existentials were checked since its label last gained one
    pub fn existentials_satisfied(&self) -> bool {
        self.existentials_satisfied
    }

    pub fn is_live(&self) -> bool {
        self.lifecycle == Lifecycle::Live
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn status(&self) -> NodeStatus {
        match self.lifecycle {
            Lifecycle::Live if self.blocking.is_blocked() => NodeStatus::Blocked,
            Lifecycle::Live => NodeStatus::Active,
            Lifecycle::Merged(_) => NodeStatus::Merged,
            Lifecycle::Pruned => NodeStatus::Pruned,
        }
    }

    /// Node this one was merged into
    pub fn merged_into(&self) -> Option<NodeId> {
        match self.lifecycle {
            Lifecycle::Merged(into) => Some(into),
            _ => None,
        }
    }
}

/// Newly derived fact awaiting rule evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    /// Node creation; matches `Thing(x)` body atoms
    Node(NodeId),
    Concept(NodeId, Concept),
    /// Atomic role name, source, target
    Role(String, NodeId, NodeId),
}

/// Reversible mutation record
#[derive(Debug, Clone)]
enum Change {
    NodeCreated(NodeId),
    ConceptAdded(NodeId, Concept),
    RoleAdded { role: String, from: NodeId, to: NodeId },
    RoleRemoved { role: String, from: NodeId, to: NodeId },
    InequalityAdded(NodeId, NodeId),
    InequalityRemoved(NodeId, NodeId),
    Merged { absorbed: NodeId },
    ParentChanged { node: NodeId, previous: Option<NodeId> },
    ExistentialsMarked(NodeId),
    ExistentialsReopened(NodeId),
}

/// Completion graph of the hypertableau.
///
/// Queries accept any `NodeId` and treat ids this graph never issued as
/// absent nodes. Mutators expect ids issued by this graph.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    first: Option<NodeId>,
    last: Option<NodeId>,
    individuals: BTreeMap<Individual, NodeId>,
    concept_index: BTreeMap<Concept, BTreeSet<NodeId>>,
    role_index: BTreeMap<String, BTreeSet<(NodeId, NodeId)>>,
    log: Vec<Change>,
    fresh: Vec<Fact>,
    changed: BTreeSet<NodeId>,
    reparented: BTreeSet<NodeId>,
    live: usize,
    merges: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position in the undo log
    pub fn checkpoint(&self) -> usize {
        self.log.len()
    }

    /// Number of nodes ever created, including pruned ones
    pub fn created(&self) -> usize {
        self.nodes.len()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Merges performed, including those later undone
    pub fn merge_count(&self) -> u64 {
        self.merges
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn record(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn record_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Representative of a node's equality class; unknown ids map to themselves
    pub fn find(&self, mut id: NodeId) -> NodeId {
        while let Some(into) = self.node(id).and_then(Node::merged_into) {
            id = into;
        }
        id
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(Node::is_live)
    }

    /// Blocking status of a node's representative; unknown ids are unblocked
    pub fn blocking(&self, id: NodeId) -> BlockingState {
        self.node(self.find(id)).map(Node::blocking).unwrap_or_default()
    }

    pub fn is_indirectly_blocked(&self, id: NodeId) -> bool {
        self.blocking(id) == BlockingState::Indirect
    }

    pub(crate) fn set_blocking(&mut self, id: NodeId, state: BlockingState) {
        self.record_mut(id).blocking = state;
    }

    /// Node of a named individual
    pub fn root(&self, individual: &Individual) -> Option<NodeId> {
        self.individuals.get(individual).map(|id| self.find(*id))
    }

    /// Creation-order traversal of all nodes that were not pruned
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        std::iter::successors(self.first.map(|id| self.record(id)), move |node| {
            node.next.map(|id| self.record(id))
        })
    }

    /// Reverse creation-order traversal of all nodes that were not pruned
    pub fn nodes_newest_first(&self) -> impl Iterator<Item = &Node> + '_ {
        std::iter::successors(self.last.map(|id| self.record(id)), move |node| {
            node.previous.map(|id| self.record(id))
        })
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes().filter(|node| node.is_live())
    }

    /// Create a fresh node; tree children name their parent
    pub fn create_node(&mut self, parent: Option<NodeId>) -> NodeId {
        self.insert_node(parent, None)
    }

    /// Root node of a named individual, created on first use
    pub fn create_root(&mut self, individual: &Individual) -> NodeId {
        match self.root(individual) {
            Some(id) => id,
            None => self.insert_node(None, Some(individual.clone())),
        }
    }

    fn insert_node(&mut self, parent: Option<NodeId>, individual: Option<Individual>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let parent = parent.map(|parent| self.find(parent));

        if let Some(individual) = &individual {
            self.individuals.insert(individual.clone(), id);
        }
        let mut node = Node::new(id, parent, individual);
        node.previous = self.last;
        self.nodes.push(node);

        match self.last {
            Some(last) => self.record_mut(last).next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);

        if let Some(parent) = parent {
            self.record_mut(parent).children.insert(id);
        }

        self.live += 1;
        self.log.push(Change::NodeCreated(id));
        self.fresh.push(Fact::Node(id));
        self.changed.insert(id);
        trace!(node = %id, parent = ?parent, "node created");
        id
    }

    /// `Thing` holds for every live node
    pub fn has_concept(&self, node: NodeId, concept: &Concept) -> bool {
        let node = self.find(node);
        match concept {
            Concept::Thing => self.is_live(node),
            Concept::Nothing => false,
            _ => self.node(node).is_some_and(|record| record.label.contains(concept)),
        }
    }

    /// Add a concept to a label; returns whether it was new
    pub fn add_concept(&mut self, node: NodeId, concept: Concept) -> Result<bool, Clash> {
        let node = self.find(node);
        match concept {
            Concept::Thing => return Ok(false),
            Concept::Nothing => return Err(ClashReason::Nothing(node).into()),
            _ => {}
        }
        if !self.record_mut(node).label.insert(concept.clone()) {
            return Ok(false);
        }

        self.concept_index.entry(concept.clone()).or_default().insert(node);
        self.log.push(Change::ConceptAdded(node, concept.clone()));
        self.changed.insert(node);
        if matches!(concept, Concept::AtLeast(_)) && self.record(node).existentials_satisfied {
            self.record_mut(node).existentials_satisfied = false;
            self.log.push(Change::ExistentialsReopened(node));
        }
        trace!(node = %node, concept = %concept, "concept added");

        if let Some(complement) = concept.complement() {
            if self.record(node).label.contains(&complement) {
                return Err(ClashReason::Complementary {
                    node,
                    concept: concept.to_string(),
                }
                .into());
            }
        }

        self.fresh.push(Fact::Concept(node, concept));
        Ok(true)
    }

    /// Add a role edge; `R-(x,y)` is stored as `R(y,x)`
    pub fn add_role(&mut self, role: &Role, from: NodeId, to: NodeId) -> bool {
        match role {
            Role::Atomic(name) => self.add_atomic_role(name, from, to),
            Role::Inverse(name) => self.add_atomic_role(name, to, from),
        }
    }

    pub fn add_atomic_role(&mut self, role: &str, from: NodeId, to: NodeId) -> bool {
        let (from, to) = (self.find(from), self.find(to));
        if !self.link_role(role, from, to) {
            return false;
        }

        self.log.push(Change::RoleAdded {
            role: role.to_string(),
            from,
            to,
        });
        self.changed.insert(from);
        self.changed.insert(to);
        self.fresh.push(Fact::Role(role.to_string(), from, to));
        trace!(role, from = %from, to = %to, "role added");
        true
    }

    fn remove_atomic_role(&mut self, role: &str, from: NodeId, to: NodeId) {
        if self.unlink_role(role, from, to) {
            self.log.push(Change::RoleRemoved {
                role: role.to_string(),
                from,
                to,
            });
            self.changed.insert(from);
            self.changed.insert(to);
        }
    }

    fn link_role(&mut self, role: &str, from: NodeId, to: NodeId) -> bool {
        let inserted = self
            .record_mut(from)
            .outgoing
            .entry(to)
            .or_default()
            .insert(role.to_string());
        if inserted {
            self.record_mut(to).incoming.entry(from).or_default().insert(role.to_string());
            self.role_index.entry(role.to_string()).or_default().insert((from, to));
        }
        inserted
    }

    fn unlink_role(&mut self, role: &str, from: NodeId, to: NodeId) -> bool {
        let removed = remove_from_multimap(&mut self.record_mut(from).outgoing, to, role);
        if removed {
            remove_from_multimap(&mut self.record_mut(to).incoming, from, role);
            if let Some(pairs) = self.role_index.get_mut(role) {
                pairs.remove(&(from, to));
                if pairs.is_empty() {
                    self.role_index.remove(role);
                }
            }
        }
        removed
    }

    pub fn has_role(&self, role: &Role, from: NodeId, to: NodeId) -> bool {
        match role {
            Role::Atomic(name) => self.has_atomic_role(name, from, to),
            Role::Inverse(name) => self.has_atomic_role(name, to, from),
        }
    }

    pub fn has_atomic_role(&self, role: &str, from: NodeId, to: NodeId) -> bool {
        let (from, to) = (self.find(from), self.find(to));
        self.node(from)
            .and_then(|record| record.outgoing.get(&to))
            .is_some_and(|roles| roles.contains(role))
    }

    /// Targets of `role` edges leaving `node`
    pub fn successors<'a>(&'a self, node: NodeId, role: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.node(self.find(node))
            .into_iter()
            .flat_map(|record| record.outgoing.iter())
            .filter(move |(_, roles)| roles.contains(role))
            .map(|(target, _)| *target)
    }

    /// Sources of `role` edges entering `node`
    pub fn predecessors<'a>(&'a self, node: NodeId, role: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.node(self.find(node))
            .into_iter()
            .flat_map(|record| record.incoming.iter())
            .filter(move |(_, roles)| roles.contains(role))
            .map(|(source, _)| *source)
    }

    /// Nodes `y` with `role(node, y)`, following inverse roles backwards
    pub fn neighbours(&self, node: NodeId, role: &Role) -> Vec<NodeId> {
        match role {
            Role::Atomic(name) => self.successors(node, name).collect(),
            Role::Inverse(name) => self.predecessors(node, name).collect(),
        }
    }

    /// Every (source, target) pair carrying `role`
    pub fn role_pairs<'a>(&'a self, role: &str) -> impl Iterator<Item = (NodeId, NodeId)> + 'a {
        self.role_index.get(role).into_iter().flatten().copied()
    }

    /// Live nodes whose label contains `concept`
    pub fn nodes_with_concept<'a>(&'a self, concept: &Concept) -> impl Iterator<Item = NodeId> + 'a {
        self.concept_index.get(concept).into_iter().flatten().copied()
    }

    pub fn are_unequal(&self, left: NodeId, right: NodeId) -> bool {
        let (left, right) = (self.find(left), self.find(right));
        self.node(left).is_some_and(|record| record.unequal.contains(&right))
    }

    /// Record `left ≠ right`; a node unequal to itself is a clash
    pub fn add_inequality(&mut self, left: NodeId, right: NodeId) -> Result<bool, Clash> {
        let (left, right) = (self.find(left), self.find(right));
        if left == right {
            return Err(ClashReason::UnequalToItself(left).into());
        }
        if !self.record_mut(left).unequal.insert(right) {
            return Ok(false);
        }
        self.record_mut(right).unequal.insert(left);
        self.log.push(Change::InequalityAdded(left, right));
        trace!(left = %left, right = %right, "inequality added");
        Ok(true)
    }

    fn remove_inequality(&mut self, left: NodeId, right: NodeId) {
        if self.record_mut(left).unequal.remove(&right) {
            self.record_mut(right).unequal.remove(&left);
            self.log.push(Change::InequalityRemoved(left, right));
        }
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) {
        let previous = self.record(node).parent;
        if previous == parent {
            return;
        }
        self.relink_parent(node, previous, parent);
        self.log.push(Change::ParentChanged { node, previous });
        self.changed.insert(node);
        self.reparented.insert(node);
    }

    fn relink_parent(&mut self, node: NodeId, from: Option<NodeId>, to: Option<NodeId>) {
        if let Some(from) = from {
            self.record_mut(from).children.remove(&node);
        }
        if let Some(to) = to {
            self.record_mut(to).children.insert(node);
        }
        self.record_mut(node).parent = to;
    }

    /// Merge two nodes into one equality class.
    ///
    /// The node with the smaller identifier survives. Ancestors and root
    /// individuals are always older than their descendants, so the survivor
    /// is never a descendant of the absorbed node. The absorbed node's
    /// edges, inequalities, children and label move to the survivor.
    /// Returns whether a merge happened.
    pub fn merge(&mut self, left: NodeId, right: NodeId) -> Result<bool, Clash> {
        let (left, right) = (self.find(left), self.find(right));
        if left == right {
            return Ok(false);
        }
        if self.are_unequal(left, right) {
            return Err(ClashReason::MergeOfUnequal { left, right }.into());
        }

        let (survivor, absorbed) = if left < right { (left, right) } else { (right, left) };
        debug!(survivor = %survivor, absorbed = %absorbed, "merging nodes");

        let record = self.record(absorbed);
        let label: Vec<Concept> = record.label.iter().cloned().collect();
        let outgoing = flatten_edges(&record.outgoing);
        let incoming = flatten_edges(&record.incoming);
        let unequal: Vec<NodeId> = record.unequal.iter().copied().collect();
        let children: Vec<NodeId> = record.children.iter().copied().collect();

        for (target, role) in outgoing {
            self.remove_atomic_role(&role, absorbed, target);
            let target = if target == absorbed { survivor } else { target };
            self.add_atomic_role(&role, survivor, target);
        }
        for (source, role) in incoming {
            // self-loops were moved with the outgoing edges
            if source == absorbed {
                continue;
            }
            self.remove_atomic_role(&role, source, absorbed);
            self.add_atomic_role(&role, source, survivor);
        }
        for other in unequal {
            self.remove_inequality(absorbed, other);
            self.add_inequality(survivor, other)?;
        }
        for child in children {
            self.set_parent(child, Some(survivor));
        }

        for concept in &label {
            remove_from_index(&mut self.concept_index, concept, absorbed);
        }
        self.record_mut(absorbed).lifecycle = Lifecycle::Merged(survivor);
        self.live -= 1;
        self.merges += 1;
        self.log.push(Change::Merged { absorbed });
        self.changed.insert(survivor);
        self.changed.insert(absorbed);

        for concept in label {
            self.add_concept(survivor, concept)?;
        }
        Ok(true)
    }

    /// Remove a node and its whole subtree from the graph
    pub fn prune_subtree(&mut self, root: NodeId) {
        let mut subtree = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if self.record(node).lifecycle == Lifecycle::Pruned {
                continue;
            }
            subtree.push(node);
            stack.extend(self.record(node).children.iter().copied());
        }
        subtree.sort_unstable_by(|a, b| b.cmp(a));

        for node in subtree {
            self.detach(node);
        }
    }

    fn detach(&mut self, node: NodeId) {
        let record = self.record(node);
        let outgoing = flatten_edges(&record.outgoing);
        let incoming = flatten_edges(&record.incoming);
        let unequal: Vec<NodeId> = record.unequal.iter().copied().collect();
        let label: Vec<Concept> = record.label.iter().cloned().collect();
        let was_live = record.is_live();
        let (parent, previous, next) = (record.parent, record.previous, record.next);

        for (target, role) in outgoing {
            self.unlink_role(&role, node, target);
        }
        for (source, role) in incoming {
            self.unlink_role(&role, source, node);
        }
        for other in unequal {
            self.record_mut(other).unequal.remove(&node);
        }
        if was_live {
            for concept in &label {
                remove_from_index(&mut self.concept_index, concept, node);
            }
            self.live -= 1;
        }
        if let Some(parent) = parent {
            self.record_mut(parent).children.remove(&node);
        }

        match previous {
            Some(previous) => self.record_mut(previous).next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => self.record_mut(next).previous = previous,
            None => self.last = previous,
        }

        if let Some(individual) = self.record(node).individual.clone() {
            self.individuals.remove(&individual);
        }

        let record = self.record_mut(node);
        record.lifecycle = Lifecycle::Pruned;
        record.blocking = BlockingState::Unblocked;
        record.label.clear();
        record.unequal.clear();
        record.children.clear();
        record.existentials_satisfied = false;
        record.previous = None;
        record.next = None;
        self.changed.remove(&node);
        self.reparented.remove(&node);
    }

    /// Undo every mutation recorded after `checkpoint`
    pub fn undo_to(&mut self, checkpoint: usize) {
        while self.log.len() > checkpoint {
            let Some(change) = self.log.pop() else { break };
            match change {
                Change::NodeCreated(node) => self.prune_subtree(node),
                Change::ConceptAdded(node, concept) => {
                    self.record_mut(node).label.remove(&concept);
                    remove_from_index(&mut self.concept_index, &concept, node);
                    self.changed.insert(node);
                }
                Change::RoleAdded { role, from, to } => {
                    self.unlink_role(&role, from, to);
                    self.changed.insert(from);
                    self.changed.insert(to);
                }
                Change::RoleRemoved { role, from, to } => {
                    self.link_role(&role, from, to);
                    self.changed.insert(from);
                    self.changed.insert(to);
                }
                Change::InequalityAdded(left, right) => {
                    self.record_mut(left).unequal.remove(&right);
                    self.record_mut(right).unequal.remove(&left);
                }
                Change::InequalityRemoved(left, right) => {
                    self.record_mut(left).unequal.insert(right);
                    self.record_mut(right).unequal.insert(left);
                }
                Change::Merged { absorbed } => {
                    let label: Vec<Concept> = self.record(absorbed).label.iter().cloned().collect();
                    for concept in label {
                        self.concept_index.entry(concept).or_default().insert(absorbed);
                    }
                    self.record_mut(absorbed).lifecycle = Lifecycle::Live;
                    self.live += 1;
                    self.changed.insert(absorbed);
                }
                Change::ParentChanged { node, previous } => {
                    let current = self.record(node).parent;
                    self.relink_parent(node, current, previous);
                    self.changed.insert(node);
                    self.reparented.insert(node);
                }
                Change::ExistentialsMarked(node) => self.record_mut(node).existentials_satisfied = false,
                Change::ExistentialsReopened(node) => self.record_mut(node).existentials_satisfied = true,
            }
        }
        self.fresh.clear();
    }

    /// Facts derived since the last call
    pub fn take_fresh(&mut self) -> Vec<Fact> {
        std::mem::take(&mut self.fresh)
    }

    /// Nodes whose label, edges or parent changed since the last call
    pub fn take_changed(&mut self) -> BTreeSet<NodeId> {
        std::mem::take(&mut self.changed)
    }

    /// Nodes moved under a new tree parent since the last call
    pub fn take_reparented(&mut self) -> BTreeSet<NodeId> {
        std::mem::take(&mut self.reparented)
    }

    /// Record that every at-least requirement of a live node currently holds
    pub fn mark_existentials_satisfied(&mut self, node: NodeId) {
        let Some(record) = self.nodes.get_mut(node.index()) else {
            return;
        };
        if record.is_live() && !record.existentials_satisfied {
            record.existentials_satisfied = true;
            self.log.push(Change::ExistentialsMarked(node));
        }
    }

    /// Every fact currently holding for a live node
    pub fn facts_of(&self, node: NodeId) -> Vec<Fact> {
        let Some(record) = self.node(node).filter(|record| record.is_live()) else {
            return Vec::new();
        };
        let mut facts = vec![Fact::Node(node)];
        facts.extend(record.label.iter().map(|concept| Fact::Concept(node, concept.clone())));
        facts.extend(
            flatten_edges(&record.outgoing)
                .into_iter()
                .map(|(target, role)| Fact::Role(role, node, target)),
        );
        facts.extend(
            flatten_edges(&record.incoming)
                .into_iter()
                .filter(|(source, _)| *source != node)
                .map(|(source, role)| Fact::Role(role, source, node)),
        );
        facts
    }

    /// Observable state, excluding blocking status
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes()
                .map(|node| NodeSnapshot {
                    id: node.id,
                    individual: node.individual.clone(),
                    parent: node.parent,
                    representative: self.find(node.id),
                    label: node.label.iter().cloned().collect(),
                    edges: node.edges().map(|(role, target)| (role.to_string(), target)).collect(),
                    unequal: node.unequal.iter().copied().collect(),
                })
                .collect(),
        }
    }
}

fn flatten_edges(edges: &BTreeMap<NodeId, BTreeSet<String>>) -> Vec<(NodeId, String)> {
    edges
        .iter()
        .flat_map(|(other, roles)| roles.iter().map(move |role| (*other, role.clone())))
        .collect()
}

fn remove_from_multimap(map: &mut BTreeMap<NodeId, BTreeSet<String>>, key: NodeId, role: &str) -> bool {
    let Some(roles) = map.get_mut(&key) else {
        return false;
    };
    let removed = roles.remove(role);
    if roles.is_empty() {
        map.remove(&key);
    }
    removed
}

fn remove_from_index(index: &mut BTreeMap<Concept, BTreeSet<NodeId>>, concept: &Concept, node: NodeId) {
    if let Some(nodes) = index.get_mut(concept) {
        nodes.remove(&node);
        if nodes.is_empty() {
            index.remove(concept);
        }
    }
}

/// Observable graph state used to compare checkpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub individual: Option<Individual>,
    pub parent: Option<NodeId>,
    pub representative: NodeId,
    pub label: Vec<Concept>,
    pub edges: Vec<(String, NodeId)>,
    pub unequal: Vec<NodeId>,
}
