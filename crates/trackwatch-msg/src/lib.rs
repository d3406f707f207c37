//! ---
//! tw_section: "02-messaging-data-model"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Telemetry schema, broadcast hub, and intake transports."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Telemetry/alert wire schema, the observer broadcast hub, and the
//! publish/subscribe intake seam used by the ingestion pipeline.

pub mod hub;
pub mod intake;
pub mod types;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MsgError>;

/// Error enumeration for payload handling and intake transports.
#[derive(Debug, thiserror::Error)]
pub enum MsgError {
    /// Wrapper for JSON serialization or deserialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A syntactically valid reading that carries no usable sensor channel.
    #[error("reading for node '{0}' carries no sensor channel")]
    EmptyReading(String),
    /// Failure inside an intake transport backend.
    #[error("transport error: {0}")]
    Transport(String),
    /// The intake channel has been closed by its producer.
    #[error("intake channel closed")]
    Closed,
}

pub use hub::BroadcastHub;
pub use intake::{ChannelIntake, IntakeHandle, IntakeMessage, IntakeSource, MqttIntake};
pub use types::{
    AlertRecord, AlertStatus, Classification, EnrichedTelemetry, OutboundEvent, SensorReading,
    Severity, SCHEMA_VERSION, STATUS_UNKNOWN,
};
