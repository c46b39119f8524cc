//! Recursion detection
//!
//! Strongly connected components over the device call graph reveal
//! recursive call cycles: a component of size ≥ 2 is mutual recursion, a
//! self-loop edge is direct self-recursion. Graph nodes are assigned dense
//! indices in insertion order, so the component layout and the
//! representative chosen for each component are deterministic for a fixed
//! edge-insertion order; downstream grouping keys off the representative.

use crate::call_graph::CallGraph;
use crate::cct::NodeId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One strongly connected component of the call graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursionGroup {
    /// Deterministically chosen member standing for the whole component.
    pub representative: NodeId,
    /// All members, trivial singletons included.
    pub members: Vec<NodeId>,
    /// A size-1 component whose node carries a `from == to` edge.
    pub self_recursive: bool,
}

/// The component partition of a call graph's node set.
#[derive(Debug, Clone, Default)]
pub struct RecursionAnalysis {
    groups: Vec<RecursionGroup>,
}

impl RecursionAnalysis {
    pub fn groups(&self) -> &[RecursionGroup] {
        &self.groups
    }

    /// Whether any call cycle exists: a component with more than one
    /// member, or a flagged self-loop.
    pub fn recursive(&self) -> bool {
        self.groups
            .iter()
            .any(|g| g.members.len() > 1 || g.self_recursive)
    }
}

/// Compute the strongly connected components of the call graph.
pub fn find_recursion(graph: &CallGraph) -> RecursionAnalysis {
    let mut dense: HashMap<NodeId, NodeIndex> = HashMap::new();
    let mut back: Vec<NodeId> = Vec::new();
    let mut g: DiGraph<(), ()> = DiGraph::new();

    let mut intern = |node: NodeId, g: &mut DiGraph<(), ()>| -> NodeIndex {
        *dense.entry(node).or_insert_with(|| {
            back.push(node);
            g.add_node(())
        })
    };

    // Nodes first (covers edge-less procedure entries), then edges, both
    // in insertion order.
    for &node in graph.nodes() {
        intern(node, &mut g);
    }
    let mut self_loops: HashSet<NodeId> = HashSet::new();
    for edge in graph.edges() {
        if edge.from == edge.to {
            debug!(node = %edge.from, "self recursion");
            self_loops.insert(edge.from);
        }
        let from = intern(edge.from, &mut g);
        let to = intern(edge.to, &mut g);
        g.add_edge(from, to, ());
    }

    let components = tarjan_scc(&g);
    let mut groups = Vec::with_capacity(components.len());
    for component in components {
        let members: Vec<NodeId> = component.iter().map(|&ix| back[ix.index()]).collect();
        let self_recursive = members.len() == 1 && self_loops.contains(&members[0]);
        groups.push(RecursionGroup {
            representative: members[0],
            members,
            self_recursive,
        });
    }

    let analysis = RecursionAnalysis { groups };
    debug!(
        nodes = graph.node_count(),
        components = analysis.groups.len(),
        recursive = analysis.recursive(),
        "scc analysis"
    );
    analysis
}
