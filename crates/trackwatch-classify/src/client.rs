//! ---
//! tw_section: "04-classification-capability"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "External anomaly classification client."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use trackwatch_msg::types::{Classification, SensorReading};

/// Classification capability consumed by the ingestion pipeline.
///
/// Implementations always succeed from the caller's perspective: any failure
/// against the underlying capability is absorbed and replaced with
/// [`Classification::fallback`]. Telemetry is periodic, so a dropped
/// detection heals on the next cycle; no retries are attempted.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one reading for tamper/damage signatures.
    async fn classify(&self, reading: &SensorReading) -> Classification;
}

#[derive(Debug, Serialize)]
struct ClassifyRequest {
    vibration_val: f64,
}

/// HTTP client for the remote classifier service.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpClassifier {
    /// Build a client for the given endpoint with a per-request deadline.
    /// The deadline keeps a hung classifier from stalling the sequential
    /// pipeline; hitting it is treated like any other failure.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = reqwest::Url::parse(endpoint)
            .with_context(|| format!("invalid classifier endpoint '{endpoint}'"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build classifier http client")?;
        Ok(Self { client, endpoint })
    }

    async fn request(&self, vibration_val: f64) -> Result<Classification> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ClassifyRequest { vibration_val })
            .send()
            .await
            .context("classifier request failed")?
            .error_for_status()
            .context("classifier returned an error status")?;
        response
            .json::<Classification>()
            .await
            .context("classifier returned an undecodable body")
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, reading: &SensorReading) -> Classification {
        let value = reading.primary_channel().unwrap_or(0.0);
        match self.request(value).await {
            Ok(classification) => classification,
            Err(err) => {
                warn!(node = %reading.node_id, error = %err, "classifier unavailable; substituting fallback");
                Classification::fallback()
            }
        }
    }
}
