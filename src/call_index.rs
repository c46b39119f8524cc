//! Call-site index
//!
//! One pre-order scan over the sampled tree, collecting every accelerator
//! call statement keyed by its resolved target address. Nodes without
//! structure, non-call statements, and calls declared on other devices are
//! ignored. Indexing has no side effects, so running it twice on an
//! unmodified tree yields identical mappings.

use crate::cct::{CctTree, NodeId};
use std::collections::BTreeMap;

/// Target address → call-site nodes sharing that target, in pre-order
/// discovery order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallSiteIndex {
    by_target: BTreeMap<u64, Vec<NodeId>>,
}

impl CallSiteIndex {
    /// Scan the tree and collect accelerator call statements.
    pub fn build(tree: &CctTree) -> Self {
        let mut by_target: BTreeMap<u64, Vec<NodeId>> = BTreeMap::new();
        for node in tree.preorder() {
            if let Some(target) = tree.device_call_target(node) {
                by_target.entry(target).or_default().push(node);
            }
        }
        Self { by_target }
    }

    /// Call-site nodes recorded under `target`, if any.
    pub fn call_sites(&self, target: u64) -> Option<&[NodeId]> {
        self.by_target.get(&target).map(Vec::as_slice)
    }

    /// Iterate targets in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[NodeId])> {
        self.by_target.iter().map(|(&t, v)| (t, v.as_slice()))
    }

    /// Number of distinct target addresses.
    pub fn target_count(&self) -> usize {
        self.by_target.len()
    }

    /// Total number of indexed call sites.
    pub fn site_count(&self) -> usize {
        self.by_target.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}
