//! `WatchersServer`: router, `WebSocket` upgrade gate, and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use watchers_core::PresenceRegistry;

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::coordinator::BroadcastCoordinator;
use crate::websocket::session::{Heartbeat, run_viewer_session};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Viewer bookkeeping and fan-out.
    pub coordinator: Arc<BroadcastCoordinator>,
    /// Shutdown signal and session tracker.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server start time, for uptime.
    pub start_time: Instant,
    /// Limits and heartbeat timing.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The watchers HTTP + `WebSocket` server.
pub struct WatchersServer {
    config: Arc<ServerConfig>,
    coordinator: Arc<BroadcastCoordinator>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl WatchersServer {
    /// Create a server with a fresh registry.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(PresenceRegistry::new()))
    }

    /// Create a server over an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Arc<PresenceRegistry>) -> Self {
        let coordinator = Arc::new(BroadcastCoordinator::new(registry, config.broadcast));
        Self {
            config: Arc::new(config),
            coordinator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let state = AppState {
            coordinator: Arc::clone(&self.coordinator),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            config: Arc::clone(&self.config),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(viewer_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `host:port` and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "watchers server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Broadcast coordinator.
    pub fn coordinator(&self) -> &Arc<BroadcastCoordinator> {
        &self.coordinator
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.coordinator.session_count(),
        state.coordinator.active_products(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Any path not routed above: a viewer upgrade, or 404.
async fn viewer_handler(
    State(state): State<AppState>,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(ws) = ws else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let Some(product_id) = state.coordinator.resolve_target(uri.path()) else {
        return (StatusCode::BAD_REQUEST, "missing product id").into_response();
    };

    if state.shutdown.is_shutting_down() {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL, "reason" => "shutting_down").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let limit = state.config.max_connections;
    if limit > 0 && state.coordinator.session_count() >= limit {
        warn!(limit, product_id = %product_id, "connection limit reached");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    // Held from here until the session's disconnect handling finishes.
    let guard = state.shutdown.session_guard();
    ws.on_upgrade(move |socket| async move {
        if state.shutdown.is_shutting_down() {
            debug!(product_id = %product_id, "shutdown began during upgrade, dropping viewer");
            return;
        }
        let (tx, rx) = mpsc::channel(state.config.send_queue_capacity);
        let connection = state.coordinator.accept(product_id, tx).await;
        run_viewer_session(
            socket,
            connection,
            rx,
            Arc::clone(&state.coordinator),
            Heartbeat::from(state.config.as_ref()),
            state.shutdown.token(),
        )
        .await;
        drop(guard);
    })
}
