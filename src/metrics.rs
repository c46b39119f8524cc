//! Metric registry
//!
//! Metric values live inside tree nodes, indexed by dense [`MetricId`]s;
//! the registry only maps metric names to ids. The reconstruction pipeline
//! cares about a single well-known name: the accelerator instruction-sample
//! counter, [`SAMPLE_METRIC`]. Its absence is not an error: incoming-weight
//! gathering falls back to uniform weights.

use crate::cct::MetricId;

/// Name of the accelerator sample-count metric used for incoming weights.
pub const SAMPLE_METRIC: &str = "GPU_ISAMP";

/// Maps metric names to dense ids.
#[derive(Debug, Default, Clone)]
pub struct MetricRegistry {
    names: Vec<String>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric name, returning its id. Registering an existing
    /// name returns the id it already has.
    pub fn register(&mut self, name: &str) -> MetricId {
        if let Some(id) = self.id_of(name) {
            return id;
        }
        self.names.push(name.to_string());
        self.names.len() - 1
    }

    pub fn id_of(&self, name: &str) -> Option<MetricId> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, id: MetricId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
