//! ---
//! tw_section: "02-messaging-data-model"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Telemetry schema, broadcast hub, and intake transports."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{AlertRecord, EnrichedTelemetry, OutboundEvent};

/// Fan-out point for observer events.
///
/// Fire-and-forget multicast over a single bounded broadcast channel: no
/// delivery guarantee, no replay. Observers that lag past the buffer depth
/// drop frames; late joiners recover alert state from the registry query
/// interface instead of the stream. The subscriber set lives inside the
/// channel, disjoint from the registry's mutation gate.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<OutboundEvent>,
}

impl BroadcastHub {
    /// Create a hub with the given per-observer buffer depth.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }

    /// Number of currently connected observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an enriched telemetry snapshot. Returns observers reached.
    pub fn publish_telemetry(&self, record: EnrichedTelemetry) -> usize {
        self.emit(OutboundEvent::SensorUpdate(record))
    }

    /// Publish an alert yielded by the correlation path.
    pub fn publish_new_alert(&self, alert: AlertRecord) -> usize {
        self.emit(OutboundEvent::NewAlert(alert))
    }

    /// Publish an alert mutated by the annotation command path.
    pub fn publish_alert_update(&self, alert: AlertRecord) -> usize {
        self.emit(OutboundEvent::AlertUpdate(alert))
    }

    fn emit(&self, event: OutboundEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(reached) => {
                debug!(event = name, observers = reached, "event broadcast");
                reached
            }
            // No observers connected; the event is simply dropped.
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertStatus, Classification, Severity, SCHEMA_VERSION};
    use chrono::Utc;

    fn telemetry(node: &str) -> EnrichedTelemetry {
        EnrichedTelemetry {
            schema_version: SCHEMA_VERSION,
            node_id: node.to_owned(),
            accel_mag: 1.0,
            accel_roll_rms: 0.7,
            mag_norm: 42.0,
            temperature: 26.0,
            humidity: 62.0,
            pressure: 1018.0,
            classification: Classification::fallback(),
            processed_at: Utc::now(),
        }
    }

    fn alert(node: &str) -> AlertRecord {
        AlertRecord {
            id: 1,
            node_id: node.to_owned(),
            lat: 0.0,
            lng: 0.0,
            location_name: "Unknown".to_owned(),
            severity: Severity::Yellow,
            status: AlertStatus::Active,
            is_construction: false,
            timestamp: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    #[tokio::test]
    async fn events_reach_all_observers() {
        let hub = BroadcastHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        assert_eq!(hub.publish_telemetry(telemetry("TRACK_SEC_42")), 2);
        assert_eq!(hub.publish_new_alert(alert("TRACK_SEC_42")), 2);

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.name(), "sensor_update");
            let event = rx.recv().await.unwrap();
            assert_eq!(event.name(), "new_alert");
        }
    }

    #[tokio::test]
    async fn publishing_without_observers_is_a_noop() {
        let hub = BroadcastHub::new(8);
        assert_eq!(hub.publish_alert_update(alert("TRACK_SEC_43")), 0);
        assert_eq!(hub.observer_count(), 0);
    }
}
