//! Pipeline driver
//!
//! Runs the full reconstruction over a sampled tree: index the device
//! call sites, build the call graph, detect and merge recursive cycles,
//! find the accelerator entry points, snapshot incoming weights, and
//! rebuild the calling contexts. The pass is a single-threaded batch over
//! an already-populated tree; it must complete before the tree is exposed
//! to any other reader.

use crate::call_graph::{build_call_graph, trace_graph};
use crate::call_index::CallSiteIndex;
use crate::cct::CctTree;
use crate::error::Result;
use crate::merge::merge_recursion_groups;
use crate::metrics::MetricRegistry;
use crate::reconstruct::{find_gpu_roots, reconstruct_contexts, ReconstructConfig};
use crate::recursion::find_recursion;
use crate::weights::gather_incoming_weights;
use serde::Serialize;
use tracing::debug;

/// Counts describing what a reconstruction pass did.
#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    /// Accelerator call sites indexed in the tree.
    pub call_sites: usize,
    /// Nodes in the (possibly merged) call graph.
    pub graph_nodes: usize,
    /// Edges in the (possibly merged) call graph.
    pub graph_edges: usize,
    /// Whether any recursive call cycle was found and merged.
    pub recursion_detected: bool,
    /// Entry points into accelerator-side execution.
    pub gpu_roots: usize,
    /// Nodes created while cloning contexts.
    pub cloned_nodes: usize,
}

/// Reconstruct the accelerator-side calling contexts of `tree` in place.
///
/// # Errors
///
/// Returns a structural inconsistency (`ReconstructError`) and leaves no
/// partially-grafted node reachable from the tree's root.
pub fn transform_device_calls(
    tree: &mut CctTree,
    metrics: &MetricRegistry,
    config: &ReconstructConfig,
) -> Result<TransformSummary> {
    let index = CallSiteIndex::build(tree);
    let mut graph = build_call_graph(tree, &index)?;
    trace_graph(tree, &graph);

    let analysis = find_recursion(&graph);
    let recursion_detected = analysis.recursive();
    let mut group_nodes = Vec::new();
    if recursion_detected {
        debug!("recursive device calls detected");
        let (merged, groups) = merge_recursion_groups(tree, &graph, &analysis);
        graph = merged;
        group_nodes = groups;
        trace_graph(tree, &graph);
    }

    let roots = find_gpu_roots(&graph);
    // Weights must be snapshot before any node is cloned or detached.
    let weights = gather_incoming_weights(tree, metrics, &graph, recursion_detected);

    debug!(roots = roots.len(), "constructing calling contexts");
    let cloned_nodes = reconstruct_contexts(tree, &graph, &weights, &roots, config)?;

    // The synthetic group originals were only scaffolding for the graph.
    for group in group_nodes {
        if tree.contains(group) {
            tree.free_subtree(group);
        }
    }

    Ok(TransformSummary {
        call_sites: index.site_count(),
        graph_nodes: graph.node_count(),
        graph_edges: graph.edge_count(),
        recursion_detected,
        gpu_roots: roots.len(),
        cloned_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cct::{NodeId, NodeKind, Structure};
    use crate::metrics::SAMPLE_METRIC;

    fn proc_frame(tree: &mut CctTree, parent: NodeId, addr: u64) -> NodeId {
        let p = tree.add_node(parent, NodeKind::ProcedureFrame);
        tree.set_structure(
            p,
            Structure::Procedure {
                device: "NVIDIA".to_string(),
                addresses: vec![addr],
            },
        );
        p
    }

    fn device_call(tree: &mut CctTree, parent: NodeId, target: u64) -> NodeId {
        let call = tree.add_node(parent, NodeKind::Statement);
        tree.set_structure(
            call,
            Structure::CallStmt {
                device: "NVIDIA".to_string(),
                target,
            },
        );
        call
    }

    #[test]
    fn test_empty_tree_is_a_no_op() {
        let mut tree = CctTree::new();
        let metrics = MetricRegistry::new();
        let summary =
            transform_device_calls(&mut tree, &metrics, &ReconstructConfig::default()).unwrap();
        assert_eq!(summary.call_sites, 0);
        assert_eq!(summary.gpu_roots, 0);
        assert_eq!(summary.cloned_nodes, 0);
        assert!(!summary.recursion_detected);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_simple_chain_end_to_end() {
        let mut tree = CctTree::new();
        let mut metrics = MetricRegistry::new();
        let samples = metrics.register(SAMPLE_METRIC);

        let host = tree.add_node(tree.root(), NodeKind::Frame);
        let a = proc_frame(&mut tree, host, 0xa);
        let b = proc_frame(&mut tree, host, 0xb);
        let ca = device_call(&mut tree, a, 0xb);
        tree.set_metric(ca, samples, 5.0);
        tree.set_metric(b, samples, 5.0);

        let summary =
            transform_device_calls(&mut tree, &metrics, &ReconstructConfig::default()).unwrap();
        assert_eq!(summary.call_sites, 1);
        assert!(!summary.recursion_detected);
        assert_eq!(summary.gpu_roots, 1);

        // One reconstructed chain a → ca → b; originals reclaimed.
        assert_eq!(tree.children(host).len(), 1);
        let a_clone = tree.children(host)[0];
        let ca_clone = tree.children(a_clone)[0];
        let b_clone = tree.children(ca_clone)[0];
        assert_eq!(tree.kind(b_clone), NodeKind::ProcedureFrame);
        assert_eq!(tree.metric(b_clone, samples), 5.0);
        assert!(!tree.contains(a));
        assert!(!tree.contains(b));
    }

    /// Mutual recursion: one loop marker frame (default config) with
    /// members beneath it, and the cycle cut at in-group call sites.
    #[test]
    fn test_mutual_recursion_end_to_end() {
        let mut tree = CctTree::new();
        let metrics = MetricRegistry::new();

        let host = tree.add_node(tree.root(), NodeKind::Frame);
        let x = proc_frame(&mut tree, host, 0x1);
        let y = proc_frame(&mut tree, host, 0x2);
        let _cx = device_call(&mut tree, x, 0x2);
        let _cy = device_call(&mut tree, y, 0x1);

        let summary =
            transform_device_calls(&mut tree, &metrics, &ReconstructConfig::default()).unwrap();
        assert!(summary.recursion_detected);

        assert_eq!(tree.children(host).len(), 1);
        let marker = tree.children(host)[0];
        assert_eq!(tree.kind(marker), NodeKind::LoopFrame);
        assert_eq!(tree.children(marker).len(), 2);
        for &member in tree.children(marker) {
            assert_eq!(tree.kind(member), NodeKind::ProcedureFrame);
            // Each member's call site survives as a leaf: recursion elided.
            let call = tree.children(member)[0];
            assert!(tree.is_leaf(call));
        }

        // No synthetic scaffolding left behind.
        let leftovers: Vec<NodeId> = tree
            .preorder()
            .filter(|&n| tree.kind(n) == NodeKind::RecursionGroup)
            .collect();
        assert!(leftovers.is_empty());
        assert!(!tree.contains(x));
        assert!(!tree.contains(y));
    }

    #[test]
    fn test_summary_serializes() {
        let mut tree = CctTree::new();
        let metrics = MetricRegistry::new();
        let summary =
            transform_device_calls(&mut tree, &metrics, &ReconstructConfig::default()).unwrap();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"recursion_detected\":false"));
    }
}
