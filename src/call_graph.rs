//! Device call graph
//!
//! A directed multigraph over existing tree-node identities. Edges mean
//! "may call" (`procedure → call-site` is containment, `call-site →
//! procedure` is resolution to a target). The graph is a derived,
//! disposable view: it owns no tree nodes and is discarded once
//! reconstruction finishes.
//!
//! Built in two passes: first every indexed call site is connected to its
//! nearest enclosing procedure frame, then every accelerator procedure
//! entry is connected back from the call sites that target its lowest
//! declared address. A call with no matching procedure simply keeps no
//! outgoing edge; a procedure with no declared address is a structural
//! inconsistency.

use crate::call_index::CallSiteIndex;
use crate::cct::{CctTree, NodeId, NodeKind};
use crate::error::{ReconstructError, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A directed edge between two tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEdge {
    pub from: NodeId,
    pub to: NodeId,
}

/// Edge list plus derived adjacency indices.
///
/// Node and edge iteration order is insertion order, which downstream
/// stages rely on for deterministic output.
#[derive(Debug, Default, Clone)]
pub struct CallGraph {
    edges: Vec<CallEdge>,
    outgoing: HashMap<NodeId, Vec<NodeId>>,
    incoming: HashMap<NodeId, Vec<NodeId>>,
    nodes: Vec<NodeId>,
    present: HashSet<NodeId>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_node(&mut self, node: NodeId) {
        if self.present.insert(node) {
            self.nodes.push(node);
        }
    }

    /// Register a node without any edge. Procedure entries enter the graph
    /// this way even when nothing calls them, so an uncalled accelerator
    /// procedure still becomes a reconstruction root.
    pub fn add_node(&mut self, node: NodeId) {
        self.note_node(node);
    }

    /// Add a directed edge. Parallel edges are permitted.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.note_node(from);
        self.note_node(to);
        self.edges.push(CallEdge { from, to });
        self.outgoing.entry(from).or_default().push(to);
        self.incoming.entry(to).or_default().push(from);
    }

    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.present.contains(&node)
    }

    /// Outgoing neighbors in edge-insertion order; empty for unknown nodes.
    pub fn outgoing(&self, node: NodeId) -> &[NodeId] {
        self.outgoing.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Incoming neighbors in edge-insertion order; empty for unknown nodes.
    pub fn incoming(&self, node: NodeId) -> &[NodeId] {
        self.incoming.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing(node).len()
    }

    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming(node).len()
    }
}

/// Build the device call graph from the tree and its call-site index.
///
/// # Errors
///
/// `CallOutsideProcedure` when an indexed call site has no enclosing
/// procedure frame; `MissingProcedureAddress` when an accelerator procedure
/// declares no entry address.
pub fn build_call_graph(tree: &CctTree, index: &CallSiteIndex) -> Result<CallGraph> {
    let mut graph = CallGraph::new();

    // Pass 1: procedure → call-site (containment)
    for (_target, sites) in index.iter() {
        for &site in sites {
            let frame = tree
                .ancestor_procedure_frame(site)
                .ok_or(ReconstructError::CallOutsideProcedure { node: site })?;
            graph.add_edge(frame, site);
        }
    }

    // Pass 2: call-site → procedure (target resolution on the lowest
    // declared address)
    for node in tree.preorder() {
        if let Some(addresses) = tree.accelerator_procedure(node) {
            let entry = *addresses
                .first()
                .ok_or(ReconstructError::MissingProcedureAddress { node })?;
            graph.add_node(node);
            if let Some(sites) = index.call_sites(entry) {
                for &site in sites {
                    graph.add_edge(site, node);
                }
            }
        }
    }

    Ok(graph)
}

/// Emit the graph as debug events, tagging endpoints as procedure `(P)`,
/// call-site `(C)`, or recursion group `(S)`.
pub fn trace_graph(tree: &CctTree, graph: &CallGraph) {
    fn tag(tree: &CctTree, node: NodeId) -> &'static str {
        if tree.accelerator_procedure(node).is_some() {
            "(P)"
        } else if tree.kind(node) == NodeKind::RecursionGroup {
            "(S)"
        } else if tree.device_call_target(node).is_some() {
            "(C)"
        } else {
            ""
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "device call graph"
    );
    for edge in graph.edges() {
        debug!(
            "{}{} -> {}{}",
            edge.from,
            tag(tree, edge.from),
            edge.to,
            tag(tree, edge.to)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cct::Structure;

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
    fn test_two_pass_construction() {
        let mut tree = CctTree::new();
        let root = tree.root();
        let caller = proc_frame(&mut tree, root, 0x10);
        let callee = proc_frame(&mut tree, root, 0x20);
        let call = device_call(&mut tree, caller, 0x20);

        let index = CallSiteIndex::build(&tree);
        let graph = build_call_graph(&tree, &index).unwrap();

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.outgoing(caller), &[call]);
        assert_eq!(graph.outgoing(call), &[callee]);
        assert_eq!(graph.incoming(callee), &[call]);
        assert!(graph.contains(caller));
    }

    #[test]
    fn test_dangling_call_keeps_no_outgoing_edge() {
        let mut tree = CctTree::new();
        let root = tree.root();
        let caller = proc_frame(&mut tree, root, 0x10);
        let call = device_call(&mut tree, caller, 0xdead);

        let index = CallSiteIndex::build(&tree);
        let graph = build_call_graph(&tree, &index).unwrap();

        assert_eq!(graph.outgoing(call), &[] as &[NodeId]);
        assert_eq!(graph.incoming(call), &[caller]);
    }

    #[test]
    fn test_uncalled_procedure_enters_node_set() {
        let mut tree = CctTree::new();
        let root = tree.root();
        let lone = proc_frame(&mut tree, root, 0x10);

        let index = CallSiteIndex::build(&tree);
        let graph = build_call_graph(&tree, &index).unwrap();

        assert!(graph.contains(lone));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.in_degree(lone), 0);
    }

    #[test]
    fn test_call_outside_procedure_is_structural_error() {
        let mut tree = CctTree::new();
        let root = tree.root();
        // Device call directly under the root frame, no procedure ancestor
        let call = device_call(&mut tree, root, 0x20);

        let index = CallSiteIndex::build(&tree);
        let err = build_call_graph(&tree, &index).unwrap_err();
        assert_eq!(err, ReconstructError::CallOutsideProcedure { node: call });
    }

    #[test]
    fn test_empty_address_set_is_structural_error() {
        let mut tree = CctTree::new();
        let p = tree.add_node(tree.root(), NodeKind::ProcedureFrame);
        tree.set_structure(
            p,
            Structure::Procedure {
                device: "NVIDIA".to_string(),
                addresses: vec![],
            },
        );

        let index = CallSiteIndex::build(&tree);
        let err = build_call_graph(&tree, &index).unwrap_err();
        assert_eq!(err, ReconstructError::MissingProcedureAddress { node: p });
    }

    #[test]
    fn test_multiple_callers_share_target() {
        let mut tree = CctTree::new();
        let root = tree.root();
        let a = proc_frame(&mut tree, root, 0x10);
        let b = proc_frame(&mut tree, root, 0x20);
        let target = proc_frame(&mut tree, root, 0x30);
        let ca = device_call(&mut tree, a, 0x30);
        let cb = device_call(&mut tree, b, 0x30);

        let index = CallSiteIndex::build(&tree);
        let graph = build_call_graph(&tree, &index).unwrap();

        assert_eq!(graph.incoming(target), &[ca, cb]);
        assert_eq!(graph.in_degree(target), 2);
    }
}
