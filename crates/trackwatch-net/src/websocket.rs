//! ---
//! tw_section: "05-networking-external-interfaces"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Query, command, and observer event-stream surfaces."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use trackwatch_msg::BroadcastHub;

struct EventStreamState {
    hub: BroadcastHub,
}

/// Builder for the WebSocket server that streams observer events.
///
/// Observers receive every event by default; a client may narrow its stream
/// to named events (`sensor_update`, `new_alert`, `alert_update`). There is
/// no replay: late joiners bootstrap alert state from the query interface.
#[derive(Clone)]
pub struct EventStreamBuilder {
    listen: SocketAddr,
    hub: BroadcastHub,
}

impl EventStreamBuilder {
    /// Create a builder bound to `listen` serving events from `hub`.
    pub fn new(listen: SocketAddr, hub: BroadcastHub) -> Self {
        Self { listen, hub }
    }

    /// Spawn the WebSocket server and return a shutdown handle.
    pub async fn spawn(self) -> anyhow::Result<EventStreamHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "event stream listening");

        let state = Arc::new(EventStreamState { hub: self.hub });
        let app = Router::new()
            .route("/ws", get(upgrade_handler))
            .with_state(state);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(err) = server.await {
                warn!(error = %err, "event stream server exited with error");
            }
        });

        Ok(EventStreamHandle {
            address: local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle for the running event stream server.
pub struct EventStreamHandle {
    address: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EventStreamHandle {
    /// Return the bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Trigger graceful shutdown and await completion.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) => Err(anyhow::anyhow!(err)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientCommand {
    action: String,
    #[serde(default)]
    events: HashSet<String>,
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<EventStreamState>>,
) -> axum::response::Response {
    ws.on_upgrade(|socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: Arc<EventStreamState>) {
    let mut subscription = state.hub.subscribe();
    // `None` forwards everything; a subscribe command narrows the stream.
    let mut allowed_events: Option<HashSet<String>> = None;

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "observer lagged behind; dropping events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if let Some(events) = &allowed_events {
                    if !events.contains(event.name()) {
                        continue;
                    }
                }

                let Ok(text) = serde_json::to_string(&event) else {
                    warn!("failed to serialise observer event");
                    continue;
                };

                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(cmd) => handle_command(cmd, &mut allowed_events),
                            Err(err) => {
                                warn!(error = %err, "invalid observer command payload");
                                let _ = socket
                                    .send(Message::Text("{\"error\":\"invalid command\"}".into()))
                                    .await;
                            }
                        }
                    }
                    Message::Binary(_) => {
                        let _ = socket
                            .send(Message::Text("{\"error\":\"binary unsupported\"}".into()))
                            .await;
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }
}

fn handle_command(cmd: ClientCommand, allowed_events: &mut Option<HashSet<String>>) {
    match cmd.action.as_str() {
        "subscribe" => {
            let mut set = allowed_events.take().unwrap_or_default();
            set.extend(cmd.events);
            *allowed_events = Some(set);
        }
        "unsubscribe" => {
            if let Some(set) = allowed_events.as_mut() {
                for event in cmd.events {
                    set.remove(&event);
                }
            }
        }
        "unsubscribe_all" => {
            *allowed_events = None;
        }
        _ => warn!(action = %cmd.action, "unknown observer command received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::time::{sleep, timeout, Duration};
    use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
    use trackwatch_msg::types::{
        AlertRecord, AlertStatus, Classification, EnrichedTelemetry, Severity, SCHEMA_VERSION,
    };

    fn telemetry(node: &str) -> EnrichedTelemetry {
        EnrichedTelemetry {
            schema_version: SCHEMA_VERSION,
            node_id: node.to_owned(),
            accel_mag: 9.8,
            accel_roll_rms: 6.86,
            mag_norm: 42.0,
            temperature: 26.0,
            humidity: 62.0,
            pressure: 1016.0,
            classification: Classification::fallback(),
            processed_at: Utc::now(),
        }
    }

    fn alert(node: &str) -> AlertRecord {
        AlertRecord {
            id: 77,
            node_id: node.to_owned(),
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

    #[tokio::test]
    async fn observers_receive_both_event_kinds_by_default() {
        let hub = BroadcastHub::new(16);
        let handle = EventStreamBuilder::new("127.0.0.1:0".parse().unwrap(), hub.clone())
            .spawn()
            .await
            .unwrap();
        let url = format!("ws://{}/ws", handle.local_addr());

        let (mut socket, _response) = connect_async(&url).await.unwrap();
        sleep(Duration::from_millis(20)).await;

        hub.publish_telemetry(telemetry("TRACK_SEC_42"));
        hub.publish_new_alert(alert("TRACK_SEC_42"));

        let first: serde_json::Value = match socket.next().await.unwrap().unwrap() {
            WsMessage::Text(payload) => serde_json::from_str(&payload).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        };
        assert_eq!(first["event"], "sensor_update");
        assert_eq!(first["data"]["node_id"], "TRACK_SEC_42");

        let second: serde_json::Value = match socket.next().await.unwrap().unwrap() {
            WsMessage::Text(payload) => serde_json::from_str(&payload).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        };
        assert_eq!(second["event"], "new_alert");
        assert_eq!(second["data"]["nodeId"], "TRACK_SEC_42");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn subscriptions_narrow_the_stream() {
        let hub = BroadcastHub::new(16);
        let handle = EventStreamBuilder::new("127.0.0.1:0".parse().unwrap(), hub.clone())
            .spawn()
            .await
            .unwrap();
        let url = format!("ws://{}/ws", handle.local_addr());

        let (mut socket, _response) = connect_async(&url).await.unwrap();
        socket
            .send(WsMessage::Text(
                json!({
                    "action": "subscribe",
                    "events": ["new_alert"]
                })
                .to_string(),
            ))
            .await
            .unwrap();
        sleep(Duration::from_millis(20)).await;

        hub.publish_telemetry(telemetry("TRACK_SEC_42"));
        hub.publish_new_alert(alert("TRACK_SEC_42"));

        let received: serde_json::Value = match socket.next().await.unwrap().unwrap() {
            WsMessage::Text(payload) => serde_json::from_str(&payload).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        };
        assert_eq!(received["event"], "new_alert");

        // The filtered-out telemetry frame must not arrive.
        assert!(timeout(Duration::from_millis(50), socket.next())
            .await
            .is_err());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_commands_are_answered_with_an_error() {
        let hub = BroadcastHub::new(16);
        let handle = EventStreamBuilder::new("127.0.0.1:0".parse().unwrap(), hub.clone())
            .spawn()
            .await
            .unwrap();
        let url = format!("ws://{}/ws", handle.local_addr());

        let (mut socket, _response) = connect_async(&url).await.unwrap();
        socket
            .send(WsMessage::Text("not json".to_owned()))
            .await
            .unwrap();

        let reply = match socket.next().await.unwrap().unwrap() {
            WsMessage::Text(payload) => payload,
            other => panic!("unexpected message: {other:?}"),
        };
        assert!(reply.contains("invalid command"));

        handle.shutdown().await.unwrap();
    }
}
