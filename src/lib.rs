//! Retejer - GPU calling-context reconstruction for sampled profiles
//!
//! This library rebuilds the accelerator-side portion of a sampled
//! calling-context tree: it indexes device call sites, derives a call
//! graph over the tree, detects and collapses recursive call cycles, and
//! clones the procedure subtrees back under their callers while
//! apportioning sample-derived metric values across the duplicated paths.

pub mod call_graph;
pub mod call_index;
pub mod cct;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod reconstruct;
pub mod recursion;
pub mod transform;
pub mod weights;
