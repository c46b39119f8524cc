//! Error types for the reconstruction pipeline
//!
//! Only structural inconsistencies are errors. An unresolved call target
//! (a call-site with no matching procedure) is a valid state handled by
//! keeping the call as a leaf, and a missing sample metric falls back to
//! uniform weighting; neither is represented here.

use crate::cct::NodeId;
use thiserror::Error;

/// Structural inconsistencies that abort a reconstruction pass
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructError {
    /// A device call-site has no enclosing procedure frame in the tree.
    #[error("device call at node {node} has no enclosing procedure frame")]
    CallOutsideProcedure { node: NodeId },

    /// A procedure entry declares no starting address.
    #[error("procedure at node {node} declares no entry address")]
    MissingProcedureAddress { node: NodeId },

    /// The incoming weights for a call target sum to zero or less, so a
    /// split factor cannot be computed.
    #[error("incoming weights for node {node} sum to {sum}, cannot split call factor")]
    ZeroWeightSum { node: NodeId, sum: f64 },
}

pub type Result<T> = std::result::Result<T, ReconstructError>;
