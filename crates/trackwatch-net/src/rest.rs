//! ---
//! tw_section: "05-networking-external-interfaces"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Query, command, and observer event-stream surfaces."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus::{Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use trackwatch_msg::types::AlertRecord;
use trackwatch_msg::BroadcastHub;
use trackwatch_registry::AlertRegistry;

/// Command payload accepted by `/api/alerts/mark-construction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkConstructionRequest {
    /// Identifier of the alert to annotate.
    pub id: i64,
}

/// Response emitted after a successful annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkConstructionResponse {
    pub success: bool,
    pub alert: AlertRecord,
}

/// Shared state injected into the axum handlers.
struct RestState {
    registry: Arc<AlertRegistry>,
    hub: BroadcastHub,
    metrics: Option<Arc<Registry>>,
}

/// Builder used to configure and spawn the REST API server.
#[derive(Clone)]
pub struct AlertsApiBuilder {
    listen: SocketAddr,
    registry: Arc<AlertRegistry>,
    hub: BroadcastHub,
    metrics: Option<Arc<Registry>>,
}

impl AlertsApiBuilder {
    /// Construct a new builder from mandatory components.
    pub fn new(listen: SocketAddr, registry: Arc<AlertRegistry>, hub: BroadcastHub) -> Self {
        Self {
            listen,
            registry,
            hub,
            metrics: None,
        }
    }

    /// Attach a Prometheus registry exposed at `/metrics`.
    pub fn with_metrics_registry(mut self, registry: Arc<Registry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Spawn the REST API server and return a handle for shutdown control.
    pub async fn spawn(self) -> anyhow::Result<AlertsApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "alerts api listening");

        let state = RestState {
            registry: self.registry,
            hub: self.hub,
            metrics: self.metrics,
        };
        let router = Router::new()
            .route("/api/alerts", get(get_alerts))
            .route("/api/alerts/mark-construction", post(post_mark_construction))
            .route("/healthz", get(get_health))
            .route("/metrics", get(get_metrics))
            .with_state(Arc::new(state));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "alerts api server exited with error");
            }
        });

        Ok(AlertsApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`AlertsApiBuilder::spawn`].
pub struct AlertsApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl AlertsApiHandle {
    /// Retrieve the socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

/// Full alert collection in creation order, for observer map bootstrap.
async fn get_alerts(State(state): State<Arc<RestState>>) -> Json<Vec<AlertRecord>> {
    Json(state.registry.list_all())
}

async fn post_mark_construction(
    State(state): State<Arc<RestState>>,
    Json(request): Json<MarkConstructionRequest>,
) -> Response {
    match state.registry.annotate_construction(request.id) {
        Ok(Some(alert)) => {
            info!(alert_id = alert.id, node = %alert.node_id, "construction annotation accepted");
            state.hub.publish_alert_update(alert.clone());
            (
                StatusCode::OK,
                Json(MarkConstructionResponse {
                    success: true,
                    alert,
                }),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Alert not found" })),
        )
            .into_response(),
        Err(err) => {
            error!(alert_id = request.id, error = %err, "annotation failed against the alert store");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "alert store unavailable" })),
            )
                .into_response()
        }
    }
}

async fn get_health() -> &'static str {
    "ok"
}

async fn get_metrics(State(state): State<Arc<RestState>>) -> Response {
    let Some(registry) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };

    let encoder = TextEncoder::new();
    let families = registry.gather();
    match encoder.encode_to_string(&families) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
