//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Ingestion pipeline and alert correlation."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::sync::Arc;

use trackwatch_common::LocationDirectory;
use trackwatch_msg::types::{Classification, Severity};
use trackwatch_registry::{AlertRegistry, Result, UpsertOutcome};

/// The sole decision point translating a classification into durable alert
/// state.
///
/// Idempotent under repeated identical inputs: a second anomaly for a node
/// with an open alert only advances that alert's `last_seen`.
#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    registry: Arc<AlertRegistry>,
    directory: LocationDirectory,
    red_threshold: f64,
}

impl CorrelationEngine {
    /// Wire the engine to its registry, directory, and severity cut-off.
    pub fn new(
        registry: Arc<AlertRegistry>,
        directory: LocationDirectory,
        red_threshold: f64,
    ) -> Self {
        Self {
            registry,
            directory,
            red_threshold,
        }
    }

    /// Severity for a confidence score. Scores below the cut-off carry
    /// stronger anomaly evidence and escalate to RED.
    pub fn severity_for(&self, confidence: f64) -> Severity {
        if confidence < self.red_threshold {
            Severity::Red
        } else {
            Severity::Yellow
        }
    }

    /// Decide whether a classification warrants registry traffic.
    ///
    /// Non-anomalies return `None` without touching the registry. Anomalies
    /// resolve the node's location and upsert the open alert for the node.
    pub fn correlate(
        &self,
        node_id: &str,
        classification: &Classification,
    ) -> Result<Option<UpsertOutcome>> {
        if !classification.is_anomaly {
            return Ok(None);
        }
        let severity = self.severity_for(classification.confidence);
        let location = self.directory.locate(node_id);
        self.registry
            .upsert_active(node_id, severity, &location)
            .map(Some)
    }
}
