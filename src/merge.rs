//! Recursion group merging
//!
//! Runs only when recursion was detected. Each strongly connected
//! component, trivial singletons included, is collapsed behind one
//! synthetic grouping node, and the graph is rebuilt around the groups:
//!
//! - `group → member` for every procedure member (the group's internal
//!   entry points),
//! - `call-site → group` for every call made into the component from
//!   outside it,
//! - `source → call-site` preserved verbatim for calls made from inside
//!   the component out to a call-site elsewhere.
//!
//! Edges internal to a component vanish, which is what elides the cycle:
//! an in-component call-site keeps no outgoing edge in the rebuilt graph
//! and reconstruction leaves it as a leaf. The old graph is discarded in
//! full; downstream stages see only the rebuilt one.

use crate::call_graph::CallGraph;
use crate::cct::{CctTree, NodeId, NodeKind};
use crate::recursion::RecursionAnalysis;
use std::collections::HashMap;
use tracing::debug;

/// Collapse every component behind a synthetic grouping node, returning
/// the rebuilt graph and the grouping nodes created in the tree (detached;
/// the caller reclaims them once the pass is over).
pub fn merge_recursion_groups(
    tree: &mut CctTree,
    old: &CallGraph,
    analysis: &RecursionAnalysis,
) -> (CallGraph, Vec<NodeId>) {
    // Node → index of its component
    let mut component_of: HashMap<NodeId, usize> = HashMap::new();
    for (idx, group) in analysis.groups().iter().enumerate() {
        for &member in &group.members {
            component_of.insert(member, idx);
        }
    }

    let mut graph = CallGraph::new();
    let mut group_nodes = Vec::with_capacity(analysis.groups().len());

    for (idx, group) in analysis.groups().iter().enumerate() {
        let group_node = tree.add_detached(NodeKind::RecursionGroup);
        group_nodes.push(group_node);

        // Internal entry points
        for &member in &group.members {
            if tree.accelerator_procedure(member).is_some() {
                graph.add_edge(group_node, member);
            }
        }

        for edge in old.edges() {
            let from_inside = component_of.get(&edge.from) == Some(&idx);
            let to_inside = component_of.get(&edge.to) == Some(&idx);
            if !from_inside && to_inside && tree.device_call_target(edge.from).is_some() {
                // Call into the component from outside
                graph.add_edge(edge.from, group_node);
            } else if from_inside && !to_inside && tree.device_call_target(edge.to).is_some() {
                // Call from inside the component out to another call-site
                graph.add_edge(edge.from, edge.to);
            }
        }
    }

    debug!(
        groups = group_nodes.len(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "merged recursion groups"
    );
    (graph, group_nodes)
}
