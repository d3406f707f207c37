//! ---
//! tw_section: "02-messaging-data-model"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Telemetry schema, broadcast hub, and intake transports."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{MsgError, Result};

/// Delay before polling the broker connection again after a failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One raw transport message awaiting ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeMessage {
    /// Topic the payload arrived on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Receipt timestamp.
    pub received_at: DateTime<Utc>,
}

impl IntakeMessage {
    /// Construct a message stamped with the current receipt time.
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Intake abstraction used by the ingestion pipeline.
///
/// Backends deliver messages one at a time; `None` means the source is
/// permanently exhausted and the pipeline should stop.
#[async_trait]
pub trait IntakeSource: Send {
    /// Await the next transport message.
    async fn next(&mut self) -> Option<IntakeMessage>;
    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// In-process intake backed by a bounded channel.
///
/// Used by the simulation feed and by tests; production uses [`MqttIntake`].
pub struct ChannelIntake {
    rx: mpsc::Receiver<IntakeMessage>,
}

impl ChannelIntake {
    /// Create a channel intake, returning the producer handle and the source.
    pub fn new(capacity: usize) -> (IntakeHandle, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (IntakeHandle { tx }, Self { rx })
    }
}

#[async_trait]
impl IntakeSource for ChannelIntake {
    async fn next(&mut self) -> Option<IntakeMessage> {
        self.rx.recv().await
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Producer side of a [`ChannelIntake`].
#[derive(Clone)]
pub struct IntakeHandle {
    tx: mpsc::Sender<IntakeMessage>,
}

impl IntakeHandle {
    /// Push a raw payload into the intake.
    pub async fn push(&self, topic: impl Into<String>, payload: Vec<u8>) -> Result<()> {
        self.tx
            .send(IntakeMessage::new(topic, payload))
            .await
            .map_err(|_| MsgError::Closed)
    }
}

/// MQTT intake subscribing to the configured sensor topic filter.
///
/// Connection failures never end the stream: the event loop is polled again
/// after a fixed delay and the subscription is re-established on every
/// connection acknowledgement.
pub struct MqttIntake {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
}

impl MqttIntake {
    /// Configure a broker session. No network traffic happens until the
    /// source is polled.
    pub fn new(
        host: &str,
        port: u16,
        client_id: &str,
        topic: &str,
        keep_alive: Duration,
    ) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(keep_alive);
        let (client, eventloop) = AsyncClient::new(options, 16);
        Self {
            client,
            eventloop,
            topic: topic.to_owned(),
        }
    }
}

#[async_trait]
impl IntakeSource for MqttIntake {
    async fn next(&mut self) -> Option<IntakeMessage> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(topic = %self.topic, "broker connected; subscribing");
                    if let Err(err) = self.client.subscribe(&self.topic, QoS::AtLeastOnce).await {
                        warn!(error = %err, "failed to queue subscription");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Some(IntakeMessage::new(publish.topic, publish.payload.to_vec()));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, delay_s = RECONNECT_DELAY.as_secs(), "broker connection error; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}
