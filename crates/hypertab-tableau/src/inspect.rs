//! 検査ビュー
//!
//! テーブルローの現在状態を読み取り専用で表示用に取り出します。
//! ここで得た情報が推論を駆動することはありません。

use crate::disjunction::{DisjunctionId, GroundDisjunct};
use crate::graph::{Graph, Node, NodeId, NodeStatus};
use crate::tableau::Tableau;
use hypertab_model::{Concept, Individual};
use itertools::Itertools;
use serde::Serialize;
use std::fmt;

/// Read-only view of a live node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub status: NodeStatus,
    pub blocked_by: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub individual: Option<Individual>,
    pub label: Vec<Concept>,
    /// (role, target) pairs
    pub edges: Vec<(String, NodeId)>,
}

impl NodeView {
    fn of(node: &Node) -> Self {
        Self {
            id: node.id(),
            status: node.status(),
            blocked_by: node.blocking().blocker(),
            parent: node.parent(),
            individual: node.individual().cloned(),
            label: node.label().iter().cloned().collect(),
            edges: node.edges().map(|(role, target)| (role.to_string(), target)).collect(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.status == NodeStatus::Blocked
    }
}

/// Read-only view of an unprocessed ground disjunction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisjunctionView {
    pub id: DisjunctionId,
    pub disjuncts: Vec<GroundDisjunct>,
}

impl fmt::Display for DisjunctionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.disjuncts.iter().join(" v "))
    }
}

impl Tableau {
    /// Live nodes in creation order
    pub fn nodes(&self) -> Vec<NodeView> {
        node_views(&self.graph)
    }

    /// Unprocessed disjunctions, most recently added first
    pub fn unprocessed_disjunctions(&self) -> Vec<DisjunctionView> {
        self.disjunctions
            .unprocessed()
            .map(|(id, disjunction)| DisjunctionView {
                id,
                disjuncts: disjunction.disjuncts().to_vec(),
            })
            .collect()
    }

    pub fn active_nodes_report(&self) -> ActiveNodesReport {
        ActiveNodesReport::from_nodes(&self.nodes())
    }

    pub fn unprocessed_disjunctions_report(&self) -> UnprocessedDisjunctionsReport {
        UnprocessedDisjunctionsReport {
            disjunctions: self.unprocessed_disjunctions(),
        }
    }
}

const RULE_WIDTH: usize = 43;

pub fn node_views(graph: &Graph) -> Vec<NodeView> {
    graph.live_nodes().map(NodeView::of).collect()
}

/// Listing of every non-blocked live node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNodesReport {
    pub ids: Vec<NodeId>,
}

impl ActiveNodesReport {
    pub fn from_nodes(nodes: &[NodeView]) -> Self {
        Self {
            ids: nodes.iter().filter(|node| !node.is_blocked()).map(|node| node.id).collect(),
        }
    }
}

impl fmt::Display for ActiveNodesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Active nodes ({}):", self.ids.len())?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f, "      ID")?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        for id in &self.ids {
            writeln!(f, "  {}", id)?;
        }
        Ok(())
    }
}

/// Listing of the unprocessed ground disjunctions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprocessedDisjunctionsReport {
    pub disjunctions: Vec<DisjunctionView>,
}

impl fmt::Display for UnprocessedDisjunctionsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unprocessed ground disjunctions")?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        for disjunction in &self.disjunctions {
            writeln!(f, "{}", disjunction)?;
        }
        Ok(())
    }
}
