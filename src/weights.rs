//! Incoming-weight gathering
//!
//! Before any node is cloned, every call target (procedure frames when no
//! recursion was found, grouping nodes otherwise) gets a weight per
//! incoming neighbor: the neighbor's accelerator sample count when the
//! metric exists, floored at 1.0, or a uniform 1.0 when it doesn't. The
//! snapshot stays valid across the whole reconstruction pass, since
//! cloning detaches and rewrites nodes that could otherwise be re-read.

use crate::call_graph::CallGraph;
use crate::cct::{CctTree, NodeId, NodeKind};
use crate::metrics::{MetricRegistry, SAMPLE_METRIC};
use std::collections::HashMap;
use tracing::debug;

/// Per-target rows of `(caller, weight)`, in incoming-edge order.
#[derive(Debug, Default, Clone)]
pub struct IncomingWeights {
    rows: HashMap<NodeId, Vec<(NodeId, f64)>>,
}

impl IncomingWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a weight for `caller` into `target`. A repeated caller
    /// (parallel edges) overwrites its previous entry.
    pub fn insert(&mut self, target: NodeId, caller: NodeId, weight: f64) {
        let row = self.rows.entry(target).or_default();
        if let Some(entry) = row.iter_mut().find(|(c, _)| *c == caller) {
            entry.1 = weight;
        } else {
            row.push((caller, weight));
        }
    }

    /// Weight of one caller into `target`; zero when unrecorded.
    pub fn weight(&self, target: NodeId, caller: NodeId) -> f64 {
        self.rows
            .get(&target)
            .and_then(|row| row.iter().find(|(c, _)| *c == caller))
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// Sum of all caller weights into `target`.
    pub fn sum(&self, target: NodeId) -> f64 {
        self.rows
            .get(&target)
            .map(|row| row.iter().map(|(_, w)| w).sum())
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Snapshot incoming weights for every eligible call target.
pub fn gather_incoming_weights(
    tree: &CctTree,
    metrics: &MetricRegistry,
    graph: &CallGraph,
    recursion_found: bool,
) -> IncomingWeights {
    let sample_metric = metrics.id_of(SAMPLE_METRIC);
    if sample_metric.is_none() {
        debug!("{SAMPLE_METRIC} not defined, falling back to uniform weights");
    }

    let mut weights = IncomingWeights::new();
    for &node in graph.nodes() {
        let eligible = if recursion_found {
            tree.kind(node) == NodeKind::RecursionGroup
        } else {
            tree.accelerator_procedure(node).is_some()
        };
        if !eligible {
            continue;
        }
        for &neighbor in graph.incoming(node) {
            let weight = match sample_metric {
                Some(id) => tree.metric(neighbor, id).max(1.0),
                None => 1.0,
            };
            weights.insert(node, neighbor, weight);
        }
    }
    weights
}
