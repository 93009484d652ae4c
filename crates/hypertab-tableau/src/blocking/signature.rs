//! ブロッキングシグネチャとキャッシュ

use crate::graph::{Graph, NodeId};
use hypertab_model::Concept;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Comparable summary of the structure a blocking check looks at
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockingSignature {
    /// The node's own label
    Single(BTreeSet<Concept>),
    /// Labels of the node and its parent plus the roles connecting them
    Pairwise {
        label: BTreeSet<Concept>,
        parent_label: BTreeSet<Concept>,
        to_parent: BTreeSet<String>,
        from_parent: BTreeSet<String>,
    },
}

impl BlockingSignature {
    pub fn single(graph: &Graph, node: NodeId) -> Self {
        BlockingSignature::Single(label_of(graph, node))
    }

    pub fn pairwise(graph: &Graph, node: NodeId) -> Self {
        let parent = graph.node(node).and_then(|record| record.parent());
        let roles = |from: NodeId, to: NodeId| -> BTreeSet<String> {
            graph
                .node(from)
                .and_then(|record| record.roles_to(to))
                .cloned()
                .unwrap_or_default()
        };

        match parent {
            Some(parent) => BlockingSignature::Pairwise {
                label: label_of(graph, node),
                parent_label: label_of(graph, parent),
                to_parent: roles(node, parent),
                from_parent: roles(parent, node),
            },
            None => BlockingSignature::Pairwise {
                label: label_of(graph, node),
                parent_label: BTreeSet::new(),
                to_parent: BTreeSet::new(),
                from_parent: BTreeSet::new(),
            },
        }
    }

    pub fn label(&self) -> &BTreeSet<Concept> {
        match self {
            BlockingSignature::Single(label) | BlockingSignature::Pairwise { label, .. } => label,
        }
    }
}

fn label_of(graph: &Graph, node: NodeId) -> BTreeSet<Concept> {
    graph.node(node).map(|record| record.label().clone()).unwrap_or_default()
}

/// Interned blocking signature; equal ids mean equal signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureId(u32);

/// Signature → nodes index.
///
/// Signatures are interned, so comparing two nodes is an integer
/// comparison. Every live node has a stored signature and sits in the
/// member set of that signature; only nodes that are currently unblocked
/// and eligible as blockers also sit in a candidate bucket.
#[derive(Debug, Default)]
pub struct SignatureCache {
    interned: BTreeMap<BlockingSignature, SignatureId>,
    signatures: BTreeMap<NodeId, SignatureId>,
    members: BTreeMap<SignatureId, BTreeSet<NodeId>>,
    buckets: BTreeMap<SignatureId, BTreeSet<NodeId>>,
    candidates: BTreeSet<NodeId>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.interned.clear();
        self.signatures.clear();
        self.members.clear();
        self.buckets.clear();
        self.candidates.clear();
    }

    pub fn signature(&self, node: NodeId) -> Option<SignatureId> {
        self.signatures.get(&node).copied()
    }

    pub fn is_candidate(&self, node: NodeId) -> bool {
        self.candidates.contains(&node)
    }

    fn intern(&mut self, signature: BlockingSignature) -> SignatureId {
        let next = SignatureId(self.interned.len() as u32);
        *self.interned.entry(signature).or_insert(next)
    }

    /// Store a recomputed signature, moving the node between buckets.
    /// Returns whether the signature changed.
    pub fn refresh(&mut self, node: NodeId, signature: BlockingSignature) -> bool {
        let id = self.intern(signature);
        let previous = self.signatures.insert(node, id);
        if previous == Some(id) {
            return false;
        }
        if let Some(previous) = previous {
            remove_member(&mut self.members, previous, node);
            if self.candidates.contains(&node) {
                remove_member(&mut self.buckets, previous, node);
            }
        }
        self.members.entry(id).or_default().insert(node);
        if self.candidates.contains(&node) {
            self.buckets.entry(id).or_default().insert(node);
        }
        true
    }

    /// Forget a node that was merged or pruned
    pub fn remove(&mut self, node: NodeId) {
        let candidate = self.candidates.remove(&node);
        if let Some(id) = self.signatures.remove(&node) {
            remove_member(&mut self.members, id, node);
            if candidate {
                remove_member(&mut self.buckets, id, node);
            }
        }
    }

    /// Add a node to, or drop it from, the bucket of its signature.
    /// Returns whether the node's candidacy changed.
    pub fn set_candidate(&mut self, node: NodeId, candidate: bool) -> bool {
        if candidate == self.candidates.contains(&node) {
            return false;
        }
        let Some(id) = self.signature(node) else {
            return false;
        };
        if candidate {
            self.candidates.insert(node);
            self.buckets.entry(id).or_default().insert(node);
        } else {
            self.candidates.remove(&node);
            remove_member(&mut self.buckets, id, node);
        }
        true
    }

    /// Candidate blockers sharing a signature, oldest first
    pub fn candidates(&self, signature: SignatureId) -> impl Iterator<Item = NodeId> + '_ {
        self.buckets.get(&signature).into_iter().flatten().copied()
    }

    /// Live nodes with the given signature created after `node`
    pub fn members_after(&self, signature: SignatureId, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.members
            .get(&signature)
            .into_iter()
            .flat_map(move |members| members.range((Bound::Excluded(node), Bound::Unbounded)))
            .copied()
    }

    /// Distinct signatures among candidate blockers
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Distinct signatures among live nodes
    pub fn signature_count(&self) -> usize {
        self.members.len()
    }
}

fn remove_member(index: &mut BTreeMap<SignatureId, BTreeSet<NodeId>>, id: SignatureId, node: NodeId) {
    if let Some(nodes) = index.get_mut(&id) {
        nodes.remove(&node);
        if nodes.is_empty() {
            index.remove(&id);
        }
    }
}
