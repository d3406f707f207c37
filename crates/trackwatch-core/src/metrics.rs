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

use prometheus::{IntCounter, Opts, Registry};

/// Shared Prometheus registry handle passed between subsystems.
pub type SharedRegistry = Arc<Registry>;

/// Create a fresh shared metrics registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Counters describing ingestion pipeline behaviour.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub messages_received: IntCounter,
    pub messages_malformed: IntCounter,
    pub classifier_fallbacks: IntCounter,
    pub anomalies_detected: IntCounter,
    pub alerts_created: IntCounter,
    pub alerts_refreshed: IntCounter,
}

impl PipelineMetrics {
    /// Register the pipeline counters against the shared registry.
    pub fn new(registry: &SharedRegistry) -> Result<Self, prometheus::Error> {
        let messages_received = IntCounter::with_opts(Opts::new(
            "tw_ingest_messages_received_total",
            "Transport messages received by the ingestion pipeline.",
        ))?;
        let messages_malformed = IntCounter::with_opts(Opts::new(
            "tw_ingest_messages_malformed_total",
            "Transport messages dropped because the payload failed to parse.",
        ))?;
        let classifier_fallbacks = IntCounter::with_opts(Opts::new(
            "tw_ingest_classifier_fallbacks_total",
            "Readings classified with the unavailability fallback.",
        ))?;
        let anomalies_detected = IntCounter::with_opts(Opts::new(
            "tw_ingest_anomalies_total",
            "Readings carrying a positive anomaly classification.",
        ))?;
        let alerts_created = IntCounter::with_opts(Opts::new(
            "tw_alerts_created_total",
            "Fresh alert records created by the correlation engine.",
        ))?;
        let alerts_refreshed = IntCounter::with_opts(Opts::new(
            "tw_alerts_refreshed_total",
            "Existing alert records refreshed by repeat anomalies.",
        ))?;

        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(messages_malformed.clone()))?;
        registry.register(Box::new(classifier_fallbacks.clone()))?;
        registry.register(Box::new(anomalies_detected.clone()))?;
        registry.register(Box::new(alerts_created.clone()))?;
        registry.register(Box::new(alerts_refreshed.clone()))?;

        Ok(Self {
            messages_received,
            messages_malformed,
            classifier_fallbacks,
            anomalies_detected,
            alerts_created,
            alerts_refreshed,
        })
    }
}
