//! Calling-context reconstruction
//!
//! The final stage: a depth-first walk from each call-graph root, cloning
//! nodes into the live tree under the correct ancestor while a running
//! adjustment factor apportions metric values across duplicated paths.
//! At a call-site the walk leaves the tree and follows graph edges; each
//! target's clone is scaled by that caller's share of the target's
//! incoming weights. Recursion groups expand behind a single synthetic
//! frame (or loop marker), and in-group call-sites have no outgoing edges
//! left, so cycles terminate as leaves.
//!
//! Clones are linked bottom-up: a subtree reaches the live tree only once
//! it is complete, and on a structural error every graft made so far is
//! unlinked and discarded, leaving the original tree intact. After all
//! roots succeed, the original procedure frames are detached and their
//! subtrees reclaimed; their cloned replacements already carry the
//! contexts.

use crate::call_graph::CallGraph;
use crate::cct::{CctTree, NodeId, NodeKind};
use crate::error::{ReconstructError, Result};
use crate::weights::IncomingWeights;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Switches controlling how recursion groups materialize in the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructConfig {
    /// Keep a frame node above the members of a multi-exit recursion
    /// group. A single-exit group never gets a frame.
    pub preserve_group_frames: bool,
    /// Substitute a synthetic loop marker for the group frame, presenting
    /// recursion the way an unrollable loop would be.
    pub simulate_recursion_with_loops: bool,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            preserve_group_frames: true,
            simulate_recursion_with_loops: true,
        }
    }
}

/// Graph nodes with no incoming edge: the entry points into
/// accelerator-side execution, in node-iteration order.
pub fn find_gpu_roots(graph: &CallGraph) -> Vec<NodeId> {
    graph
        .nodes()
        .iter()
        .copied()
        .filter(|&n| graph.in_degree(n) == 0)
        .collect()
}

struct Walker<'a> {
    tree: &'a mut CctTree,
    graph: &'a CallGraph,
    weights: &'a IncomingWeights,
    config: &'a ReconstructConfig,
    /// Every clone minted this pass, for rollback.
    created: Vec<NodeId>,
    /// Clones linked under original tree nodes.
    grafted: Vec<NodeId>,
}

impl Walker<'_> {
    fn run(&mut self, roots: &[NodeId]) -> Result<()> {
        for &root in roots {
            let Some(attach) = self.attachment_point(root) else {
                continue;
            };
            let top = self.copy_path(root, 1.0)?;
            self.tree.link(top, attach);
            self.grafted.push(top);
        }
        Ok(())
    }

    /// Where a root's cloned subtree gets grafted: the root's own parent,
    /// or for a synthetic group root the parent of its first member.
    fn attachment_point(&self, root: NodeId) -> Option<NodeId> {
        let anchor = if self.tree.kind(root) == NodeKind::RecursionGroup {
            match self.graph.outgoing(root).first() {
                Some(&first) => first,
                None => {
                    debug!(%root, "recursion group root has no members, skipping");
                    return None;
                }
            }
        } else {
            root
        };
        let parent = self.tree.parent(anchor);
        if parent.is_none() {
            warn!(%root, "gpu root has no parent to graft under, skipping");
        }
        parent
    }

    fn mint_clone(&mut self, node: NodeId) -> NodeId {
        let clone = self.tree.clone_node(node);
        self.created.push(clone);
        clone
    }

    fn mint_loop_frame(&mut self) -> NodeId {
        let frame = self.tree.add_detached(NodeKind::LoopFrame);
        self.created.push(frame);
        frame
    }

    /// Build the detached clone subtree for `cur` scaled by `factor` and
    /// return its top node. The caller links it.
    fn copy_path(&mut self, cur: NodeId, factor: f64) -> Result<NodeId> {
        if self.tree.kind(cur) == NodeKind::RecursionGroup {
            return self.copy_group(cur, factor);
        }

        let clone = self.mint_clone(cur);
        self.tree.scale_metrics(clone, factor);

        if self.tree.device_call_target(cur).is_some() {
            // Follow graph edges instead of tree children. A call with no
            // outgoing edge stays a leaf (unresolved target, valid state).
            let targets = self.graph.outgoing(cur).to_vec();
            for target in targets {
                let sum = self.weights.sum(target);
                if sum <= 0.0 {
                    return Err(ReconstructError::ZeroWeightSum { node: target, sum });
                }
                let share = self.weights.weight(target, cur) / sum;
                debug!(call = %cur, %target, share, "laying over a call");
                let child = self.copy_path(target, factor * share)?;
                self.tree.link(child, clone);
            }
        } else {
            let children = self.tree.children(cur).to_vec();
            for child in children {
                let copy = self.copy_path(child, factor)?;
                self.tree.link(copy, clone);
            }
        }
        Ok(clone)
    }

    /// Expand a recursion group. A single exit needs no frame and no
    /// split; multiple exits go behind one synthetic frame, either a
    /// clone of the group node or a loop marker when frames are
    /// suppressed or loop simulation is on.
    fn copy_group(&mut self, group: NodeId, factor: f64) -> Result<NodeId> {
        let targets = self.graph.outgoing(group).to_vec();
        if targets.len() == 1 {
            return self.copy_path(targets[0], factor);
        }

        let frame = if self.config.preserve_group_frames && !self.config.simulate_recursion_with_loops
        {
            self.mint_clone(group)
        } else {
            self.mint_loop_frame()
        };
        self.tree.scale_metrics(frame, factor);
        debug!(%group, exits = targets.len(), "laying over a recursion group");
        for target in targets {
            let child = self.copy_path(target, factor)?;
            self.tree.link(child, frame);
        }
        Ok(frame)
    }
}

/// Walk every root, graft the reconstructed contexts, then detach and
/// reclaim the original procedure subtrees. Returns the number of nodes
/// created.
///
/// On a structural error the pass rolls back: every graft is unlinked and
/// every clone discarded, so nothing partial stays reachable from the
/// tree's root.
pub fn reconstruct_contexts(
    tree: &mut CctTree,
    graph: &CallGraph,
    weights: &IncomingWeights,
    roots: &[NodeId],
    config: &ReconstructConfig,
) -> Result<usize> {
    let created_count;
    {
        let mut walker = Walker {
            tree: &mut *tree,
            graph,
            weights,
            config,
            created: Vec::new(),
            grafted: Vec::new(),
        };
        if let Err(err) = walker.run(roots) {
            for &graft in &walker.grafted {
                walker.tree.unlink(graft);
            }
            for &clone in &walker.created {
                walker.tree.discard_node(clone);
            }
            return Err(err);
        }
        created_count = walker.created.len();
    }

    // The clones carry the contexts now; detach the original procedure
    // frames, then reclaim each detached subtree. Every procedure frame
    // in the graph counts: a host-side caller frame holding a device
    // launch was cloned as a root and would otherwise stay linked twice.
    let procedures: Vec<NodeId> = graph
        .nodes()
        .iter()
        .copied()
        .filter(|&n| tree.kind(n) == NodeKind::ProcedureFrame)
        .collect();
    for &p in &procedures {
        tree.unlink(p);
    }
    for &p in &procedures {
        tree.free_subtree(p);
    }

    Ok(created_count)
}
