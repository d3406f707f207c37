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

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use trackwatch_classify::Classifier;
use trackwatch_msg::intake::{IntakeMessage, IntakeSource};
use trackwatch_msg::types::SensorReading;
use trackwatch_msg::BroadcastHub;

use crate::correlation::CorrelationEngine;
use crate::enrich::FieldSynthesizer;
use crate::metrics::PipelineMetrics;

/// Orchestrates one ingestion stream.
///
/// Messages are processed sequentially in arrival order. Any single-message
/// failure is isolated: malformed payloads are dropped with a warning,
/// classifier failures are already absorbed inside the client, and registry
/// failures are logged because the ingestion path has no synchronous caller
/// to report to. The loop itself only stops on shutdown or source exhaustion.
pub struct IngestionPipeline<S: IntakeSource> {
    intake: S,
    classifier: Arc<dyn Classifier>,
    synthesizer: FieldSynthesizer,
    correlation: CorrelationEngine,
    hub: BroadcastHub,
    metrics: Option<PipelineMetrics>,
}

impl<S: IntakeSource> IngestionPipeline<S> {
    /// Assemble a pipeline over its injected collaborators.
    pub fn new(
        intake: S,
        classifier: Arc<dyn Classifier>,
        synthesizer: FieldSynthesizer,
        correlation: CorrelationEngine,
        hub: BroadcastHub,
    ) -> Self {
        Self {
            intake,
            classifier,
            synthesizer,
            correlation,
            hub,
            metrics: None,
        }
    }

    /// Attach pipeline counters.
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the intake until shutdown is signalled or the source closes.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(source = self.intake.name(), "ingestion pipeline started");
        loop {
            let message = tokio::select! {
                _ = shutdown.recv() => {
                    info!("ingestion pipeline shutdown");
                    break;
                }
                message = self.intake.next() => message,
            };
            match message {
                Some(message) => self.process(message).await,
                None => {
                    info!("intake source closed; ingestion pipeline stopping");
                    break;
                }
            }
        }
    }

    async fn process(&mut self, message: IntakeMessage) {
        if let Some(metrics) = &self.metrics {
            metrics.messages_received.inc();
        }

        let reading = match SensorReading::from_slice(&message.payload) {
            Ok(reading) => reading,
            Err(err) => {
                warn!(topic = %message.topic, error = %err, "dropping malformed telemetry payload");
                if let Some(metrics) = &self.metrics {
                    metrics.messages_malformed.inc();
                }
                return;
            }
        };

        let classification = self.classifier.classify(&reading).await;
        if classification.is_fallback() {
            if let Some(metrics) = &self.metrics {
                metrics.classifier_fallbacks.inc();
            }
        }

        let enriched = self.synthesizer.enrich(&reading, classification.clone());
        self.hub.publish_telemetry(enriched);

        if classification.is_anomaly {
            warn!(
                node = %reading.node_id,
                confidence = classification.confidence,
                status = %classification.status,
                "tamper signature classified"
            );
            if let Some(metrics) = &self.metrics {
                metrics.anomalies_detected.inc();
            }
        }

        match self.correlation.correlate(&reading.node_id, &classification) {
            Ok(Some(outcome)) => {
                if let Some(metrics) = &self.metrics {
                    if outcome.created {
                        metrics.alerts_created.inc();
                    } else {
                        metrics.alerts_refreshed.inc();
                    }
                }
                if outcome.created {
                    info!(
                        node = %outcome.record.node_id,
                        alert_id = outcome.record.id,
                        severity = ?outcome.record.severity,
                        location = %outcome.record.location_name,
                        "alert raised"
                    );
                } else {
                    debug!(
                        node = %outcome.record.node_id,
                        alert_id = outcome.record.id,
                        "open alert refreshed"
                    );
                }
                self.hub.publish_new_alert(outcome.record);
            }
            Ok(None) => {}
            Err(err) => {
                error!(node = %reading.node_id, error = %err, "alert registry mutation failed");
            }
        }
    }
}
