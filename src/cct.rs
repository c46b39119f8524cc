//! Arena-backed calling-context tree
//!
//! The sampled profile is a tree of frames, call statements, and procedure
//! frames, each annotated with metric values and an optional static-structure
//! classification. Nodes live in an arena and are addressed by stable
//! [`NodeId`]s; parent→child links carry the only ownership. The call graph
//! built over the tree is a derived view keyed by these ids and never holds
//! owning references of its own.
//!
//! Mutation surface: `clone_node` (detached copy, no children), `link`
//! (append as last child), `unlink` (detach without destroying), and
//! `free_subtree` (detach and eagerly reclaim a whole subtree).

use std::fmt;

/// Vendor tag identifying calls that execute on the accelerator.
pub const ACCELERATOR_VENDOR: &str = "NVIDIA";

/// Metric index into a node's metric value vector.
pub type MetricId = usize;

/// Stable identity of a tree node (arena index).
///
/// Ids are never reused within a reconstruction pass; a freed id is a
/// tombstone and must not be dereferenced again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Generic interior frame (host call path, context nodes).
    Frame,
    /// A statement instance, possibly a call statement.
    Statement,
    /// A procedure activation frame.
    ProcedureFrame,
    /// Synthetic node standing in for a recursive call cycle.
    RecursionGroup,
    /// Synthetic loop-style marker substituted for a recursion frame.
    LoopFrame,
}

/// Static-structure classification attached to a node.
///
/// This is the closed tagged variant returned by the structure lookup; it
/// replaces runtime type inspection of structure objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    /// A call statement with its declared execution device and resolved
    /// target address.
    CallStmt { device: String, target: u64 },
    /// A procedure entry with its declared starting addresses (sorted,
    /// lowest first). An empty address set is structurally invalid wherever
    /// an address is demanded.
    Procedure { device: String, addresses: Vec<u64> },
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    structure: Option<Structure>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    metrics: Vec<f64>,
}

/// The calling-context tree.
#[derive(Debug)]
pub struct CctTree {
    nodes: Vec<Option<NodeData>>,
    root: NodeId,
}

impl Default for CctTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CctTree {
    /// Create a tree holding only its root frame.
    pub fn new() -> Self {
        let root = NodeData {
            kind: NodeKind::Frame,
            structure: None,
            parent: None,
            children: Vec::new(),
            metrics: Vec::new(),
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &NodeData {
        self.nodes[id.index()].as_ref().expect("stale node id")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.nodes[id.index()].as_mut().expect("stale node id")
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(data));
        id
    }

    /// Add a node as the last child of `parent`.
    pub fn add_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.push(NodeData {
            kind,
            structure: None,
            parent: Some(parent),
            children: Vec::new(),
            metrics: Vec::new(),
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Add a detached node (no parent). Used for synthetic group nodes.
    pub fn add_detached(&mut self, kind: NodeKind) -> NodeId {
        self.push(NodeData {
            kind,
            structure: None,
            parent: None,
            children: Vec::new(),
            metrics: Vec::new(),
        })
    }

    /// Attach a static-structure classification to a node. Procedure
    /// addresses are kept sorted so the lowest address is always first.
    pub fn set_structure(&mut self, id: NodeId, mut structure: Structure) {
        if let Structure::Procedure { addresses, .. } = &mut structure {
            addresses.sort_unstable();
        }
        self.node_mut(id).structure = Some(structure);
    }

    pub fn structure(&self, id: NodeId) -> Option<&Structure> {
        self.node(id).structure.as_ref()
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).children.is_empty()
    }

    /// Whether `id` refers to a live (not freed) node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.index())
            .map(Option::is_some)
            .unwrap_or(false)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Target address of an accelerator call statement, if this node is one.
    pub fn device_call_target(&self, id: NodeId) -> Option<u64> {
        match self.structure(id) {
            Some(Structure::CallStmt { device, target })
                if device.contains(ACCELERATOR_VENDOR) =>
            {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Declared addresses of an accelerator procedure entry, if this node
    /// is one. Sorted, lowest first; may be empty (structurally invalid).
    pub fn accelerator_procedure(&self, id: NodeId) -> Option<&[u64]> {
        match self.structure(id) {
            Some(Structure::Procedure { device, addresses })
                if device.contains(ACCELERATOR_VENDOR) =>
            {
                Some(addresses)
            }
            _ => None,
        }
    }

    /// Nearest enclosing procedure frame, walking strictly upward from `id`.
    pub fn ancestor_procedure_frame(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.parent(id);
        while let Some(n) = cur {
            if self.kind(n) == NodeKind::ProcedureFrame {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Metric value for `id`, zero if unset.
    pub fn metric(&self, id: NodeId, metric: MetricId) -> f64 {
        self.node(id).metrics.get(metric).copied().unwrap_or(0.0)
    }

    pub fn set_metric(&mut self, id: NodeId, metric: MetricId, value: f64) {
        let metrics = &mut self.node_mut(id).metrics;
        if metrics.len() <= metric {
            metrics.resize(metric + 1, 0.0);
        }
        metrics[metric] = value;
    }

    pub fn num_metrics(&self, id: NodeId) -> usize {
        self.node(id).metrics.len()
    }

    /// Multiply every metric value of `id` by `factor`.
    pub fn scale_metrics(&mut self, id: NodeId, factor: f64) {
        for value in &mut self.node_mut(id).metrics {
            *value *= factor;
        }
    }

    /// Detached copy of a node: kind, structure and metric values are
    /// copied; the clone has no parent and no children.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let src = self.node(id);
        let data = NodeData {
            kind: src.kind,
            structure: src.structure.clone(),
            parent: None,
            children: Vec::new(),
            metrics: src.metrics.clone(),
        };
        self.push(data)
    }

    /// Attach a detached node as the last child of `parent`.
    pub fn link(&mut self, id: NodeId, parent: NodeId) {
        debug_assert!(self.node(id).parent.is_none(), "link of an attached node");
        self.node_mut(id).parent = Some(parent);
        self.node_mut(parent).children.push(id);
    }

    /// Detach a node from its parent without destroying it. No-op when
    /// already detached.
    pub fn unlink(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|&c| c != id);
            self.node_mut(id).parent = None;
        }
    }

    /// Detach `id` and eagerly reclaim its whole subtree. Every node in the
    /// subtree becomes a tombstone; its ids must not be used afterwards.
    pub fn free_subtree(&mut self, id: NodeId) {
        self.unlink(id);
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(data) = self.nodes[n.index()].take() {
                stack.extend(data.children);
            }
        }
    }

    /// Drop a single node's slot without fixing up links. Used by the
    /// reconstruction rollback, where every node of a detached partial
    /// clone forest is discarded at once.
    pub(crate) fn discard_node(&mut self, id: NodeId) {
        self.nodes[id.index()] = None;
    }

    /// Pre-order iterator over the live tree, fixed child order.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Pre-order iterator over the subtree rooted at `id`.
    pub fn preorder_from(&self, id: NodeId) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![id],
        }
    }
}

/// Pre-order traversal over a [`CctTree`].
pub struct Preorder<'a> {
    tree: &'a CctTree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        let children = self.tree.children(next);
        self.stack.extend(children.iter().rev());
        Some(next)
    }
}
