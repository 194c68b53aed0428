//! `RelayServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use roomcast_engine::Hub;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::config::RelayConfig;
use crate::health::HealthResponse;
use crate::metrics::WS_AUTH_FAILURES_TOTAL;
use crate::session::{run_session, SessionSettings};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The relay engine.
    pub hub: Arc<Hub>,
    /// Token authenticator; `None` when no secret is configured.
    pub auth: Option<Arc<Authenticator>>,
    /// Per-session tuning.
    pub settings: SessionSettings,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The relay HTTP/WebSocket server.
pub struct RelayServer {
    config: RelayConfig,
    hub: Arc<Hub>,
    auth: Option<Arc<Authenticator>>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server around an existing hub.
    ///
    /// Auth is enabled iff the configured secret is non-empty.
    pub fn new(config: RelayConfig, hub: Arc<Hub>, metrics: PrometheusHandle) -> Self {
        let auth = if config.auth.secret.is_empty() {
            warn!("no auth secret configured, accepting unauthenticated connections");
            None
        } else {
            Some(Arc::new(Authenticator::new(&config.auth.secret)))
        };
        Self {
            config,
            hub,
            auth,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            auth: self.auth.clone(),
            settings: SessionSettings {
                heartbeat_interval: Duration::from_secs(
                    self.config.session.heartbeat_interval_secs,
                ),
                send_queue_depth: self.config.session.send_queue_depth,
            },
            max_message_size: self.config.session.max_message_size,
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// Bind and start serving. Returns the bound address and the serve task.
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let router = self.router();
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let token = self.shutdown.token();
        let hub = self.hub.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .ok();
            hub.shutdown();
        });

        info!(addr = %local_addr, "relay server listening");
        Ok((local_addr, handle))
    }

    /// Get the relay engine.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Query parameters accepted on the WebSocket upgrade.
#[derive(Debug, Deserialize)]
struct WsQuery {
    /// Access token; required when auth is configured.
    token: Option<String>,
    /// Caller-chosen identity stamped into published payloads.
    subject: Option<String>,
}

/// GET /ws (and /) — WebSocket upgrade with pre-upgrade token check.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    if let Some(auth) = &state.auth {
        let token = query.token.as_deref().unwrap_or_default();
        if let Err(e) = auth.validate(token) {
            warn!(error = %e, "rejected websocket upgrade");
            counter!(WS_AUTH_FAILURES_TOTAL, "reason" => e.to_string().replace(' ', "_"))
                .increment(1);
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    }

    let hub = state.hub.clone();
    let settings = state.settings;
    let shutdown = state.shutdown.token();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_session(socket, hub, settings, query.subject, shutdown))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::capture(state.start_time, &state.hub.stats()))
}

/// GET /metrics — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
