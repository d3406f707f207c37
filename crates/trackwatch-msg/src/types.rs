//! ---
//! tw_section: "02-messaging-data-model"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Telemetry schema, broadcast hub, and intake transports."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MsgError, Result};

/// Schema version stamped on every enriched telemetry record.
pub const SCHEMA_VERSION: u16 = 1;

/// Status label substituted when the classifier is unreachable.
pub const STATUS_UNKNOWN: &str = "UNKNOWN";

/// Raw telemetry payload published by a track-side sensor node.
///
/// All channels are optional; field nodes frequently report only the raw
/// vibration value. Unknown payload fields are normalized away rather than
/// carried through untyped. A reading is only usable when the node identifier
/// is present and at least one channel is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Stable identifier of the publishing node.
    pub node_id: String,
    /// Raw vibration channel, the primary tamper signal.
    #[serde(default)]
    pub vibration_val: Option<f64>,
    /// Composite acceleration magnitude, when the node computes it locally.
    #[serde(default)]
    pub accel_mag: Option<f64>,
    /// RMS of the roll axis acceleration.
    #[serde(default)]
    pub accel_roll_rms: Option<f64>,
    /// Magnetic field norm in microtesla.
    #[serde(default)]
    pub mag_norm: Option<f64>,
    /// Ambient temperature in degrees Celsius.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Relative humidity percentage.
    #[serde(default)]
    pub humidity: Option<f64>,
    /// Barometric pressure in hectopascal.
    #[serde(default)]
    pub pressure: Option<f64>,
}

impl SensorReading {
    /// Parse a transport payload, rejecting readings with no sensor channel.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let reading: SensorReading = serde_json::from_slice(payload)?;
        if reading.primary_channel().is_none() {
            return Err(MsgError::EmptyReading(reading.node_id));
        }
        Ok(reading)
    }

    /// The channel value forwarded to the classifier: the raw vibration
    /// value, or the precomputed acceleration magnitude as a stand-in.
    pub fn primary_channel(&self) -> Option<f64> {
        self.vibration_val.or(self.accel_mag)
    }
}

/// Outcome of one classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Human-readable status label reported by the classifier.
    pub status: String,
    /// Signed decision score; lower/negative means stronger anomaly evidence.
    pub confidence: f64,
    /// True when the reading matches a tamper/damage signature.
    pub is_anomaly: bool,
}

impl Classification {
    /// Substitute value used when the classifier is unreachable. The pipeline
    /// never blocks on classifier availability; dropped detections heal on the
    /// next periodic reading.
    pub fn fallback() -> Self {
        Self {
            status: STATUS_UNKNOWN.to_owned(),
            confidence: 0.0,
            is_anomaly: false,
        }
    }

    /// Whether this value is the unavailability fallback.
    pub fn is_fallback(&self) -> bool {
        self.status == STATUS_UNKNOWN
    }
}

/// Fully populated telemetry record pushed to observers.
///
/// Channels absent from the raw payload are synthesized from bounded
/// baselines before broadcast, so the record is always complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTelemetry {
    /// Version of this broadcast schema.
    pub schema_version: u16,
    /// Identifier of the originating node.
    pub node_id: String,
    /// Composite acceleration magnitude.
    pub accel_mag: f64,
    /// RMS of the roll axis acceleration.
    pub accel_roll_rms: f64,
    /// Magnetic field norm in microtesla.
    pub mag_norm: f64,
    /// Ambient temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Barometric pressure in hectopascal.
    pub pressure: f64,
    /// Classification outcome, flattened into the record for observers.
    #[serde(flatten)]
    pub classification: Classification,
    /// Timestamp when the pipeline finished processing the reading.
    pub processed_at: DateTime<Utc>,
}

/// Alert severity derived from the classification confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Strong anomaly evidence.
    #[serde(rename = "RED")]
    Red,
    /// Weaker anomaly evidence.
    #[serde(rename = "YELLOW")]
    Yellow,
}

/// Lifecycle status of an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    /// The alert is live and deduplicates further anomalies for its node.
    #[serde(rename = "ACTIVE")]
    Active,
    /// The alert has been resolved. No code path in the observed flow drives
    /// this transition; the variant exists for the stored data contract.
    #[serde(rename = "FIXED")]
    Fixed,
}

/// Durable record of one correlated incident.
///
/// Field names follow the deployed observer wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Unique monotonic identifier, assigned once at creation.
    pub id: i64,
    /// Identifier of the node the alert belongs to.
    #[serde(rename = "nodeId")]
    pub node_id: String,
    /// Latitude copied from the location directory at creation time.
    pub lat: f64,
    /// Longitude copied from the location directory at creation time.
    pub lng: f64,
    /// Display name copied from the location directory at creation time.
    #[serde(rename = "locationName")]
    pub location_name: String,
    /// Severity assigned at creation; never overwritten by later anomalies.
    pub severity: Severity,
    /// Lifecycle status.
    pub status: AlertStatus,
    /// One-way construction annotation; setting it never touches `status`.
    #[serde(rename = "isConstruction")]
    pub is_construction: bool,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Timestamp of the most recent anomaly observed for this alert.
    pub last_seen: DateTime<Utc>,
}

impl AlertRecord {
    /// Whether this record still deduplicates anomalies for its node.
    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Fixed
    }
}

/// Event pushed to connected observers.
///
/// Serialized with the event name as the tag, matching the deployed observer
/// contract: enriched telemetry on `sensor_update`, correlation output on
/// `new_alert`, annotation results on `alert_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Enriched telemetry snapshot.
    SensorUpdate(EnrichedTelemetry),
    /// Alert yielded by the correlation path.
    NewAlert(AlertRecord),
    /// Alert mutated by the annotation command path.
    AlertUpdate(AlertRecord),
}

impl OutboundEvent {
    /// The wire-level event name, usable for observer-side filtering.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SensorUpdate(_) => "sensor_update",
            OutboundEvent::NewAlert(_) => "new_alert",
            OutboundEvent::AlertUpdate(_) => "alert_update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_alert() -> AlertRecord {
        AlertRecord {
            id: 1723400000000,
            node_id: "TRACK_SEC_42".to_owned(),
            lat: 28.6139,
            lng: 77.2090,
            location_name: "New Delhi Central".to_owned(),
            severity: Severity::Red,
            status: AlertStatus::Active,
            is_construction: false,
            timestamp: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn reading_parses_and_ignores_unknown_fields() {
        let payload = json!({
            "node_id": "TRACK_SEC_42",
            "vibration_val": 9.8,
            "firmware": "esp32-v4"
        });
        let reading = SensorReading::from_slice(payload.to_string().as_bytes()).unwrap();
        assert_eq!(reading.node_id, "TRACK_SEC_42");
        assert_eq!(reading.primary_channel(), Some(9.8));
    }

    #[test]
    fn reading_without_node_id_is_rejected() {
        let err = SensorReading::from_slice(br#"{"vibration_val": 1.0}"#).unwrap_err();
        assert!(matches!(err, MsgError::Json(_)));
    }

    #[test]
    fn reading_without_any_channel_is_rejected() {
        let err = SensorReading::from_slice(br#"{"node_id": "TRACK_SEC_42"}"#).unwrap_err();
        assert!(matches!(err, MsgError::EmptyReading(node) if node == "TRACK_SEC_42"));
    }

    #[test]
    fn accel_mag_substitutes_for_missing_vibration() {
        let reading =
            SensorReading::from_slice(br#"{"node_id": "TRACK_SEC_43", "accel_mag": 3.2}"#).unwrap();
        assert_eq!(reading.primary_channel(), Some(3.2));
    }

    #[test]
    fn fallback_classification_shape() {
        let fallback = Classification::fallback();
        assert_eq!(fallback.status, "UNKNOWN");
        assert_eq!(fallback.confidence, 0.0);
        assert!(!fallback.is_anomaly);
        assert!(fallback.is_fallback());
    }

    #[test]
    fn alert_record_uses_deployed_wire_names() {
        let value = serde_json::to_value(sample_alert()).unwrap();
        assert_eq!(value["nodeId"], "TRACK_SEC_42");
        assert_eq!(value["locationName"], "New Delhi Central");
        assert_eq!(value["isConstruction"], false);
        assert_eq!(value["severity"], "RED");
        assert_eq!(value["status"], "ACTIVE");
        assert!(value.get("node_id").is_none());
    }

    #[test]
    fn outbound_events_tag_with_event_names() {
        let event = OutboundEvent::NewAlert(sample_alert());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "new_alert");
        assert_eq!(value["data"]["nodeId"], "TRACK_SEC_42");
        assert_eq!(event.name(), "new_alert");

        let update = OutboundEvent::AlertUpdate(sample_alert());
        assert_eq!(serde_json::to_value(&update).unwrap()["event"], "alert_update");
    }

    #[test]
    fn enriched_record_flattens_classification() {
        let record = EnrichedTelemetry {
            schema_version: SCHEMA_VERSION,
            node_id: "TRACK_SEC_42".to_owned(),
            accel_mag: 9.8,
            accel_roll_rms: 6.86,
            mag_norm: 41.5,
            temperature: 25.8,
            humidity: 61.0,
            pressure: 1015.2,
            classification: Classification {
                status: "TAMPERING DETECTED".to_owned(),
                confidence: -0.35,
                is_anomaly: true,
            },
            processed_at: Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "TAMPERING DETECTED");
        assert_eq!(value["is_anomaly"], true);
        assert_eq!(value["accel_mag"], 9.8);
        assert!(value.get("classification").is_none());
    }
}
