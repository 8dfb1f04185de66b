//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// RFC 3339 time the report was produced.
    pub timestamp: String,
    /// Seconds since the server started.
    pub uptime: f64,
    /// Live viewer figures.
    pub websocket: WebsocketHealth,
}

/// Viewer figures reported under `websocket`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketHealth {
    /// Open viewer sessions.
    pub connected_clients: usize,
    /// Products with at least one watcher.
    pub active_products: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connected_clients: usize,
    active_products: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: start_time.elapsed().as_secs_f64(),
        websocket: WebsocketHealth {
            connected_clients,
            active_products,
        },
    }
}
