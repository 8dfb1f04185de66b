//! Viewer session lifecycle: handles one upgraded socket from the welcome
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ViewerConnection;
use super::coordinator::BroadcastCoordinator;
use crate::config::ServerConfig;
use crate::metrics::WS_CONNECTION_DURATION_SECONDS;

/// Heartbeat timing for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Interval between server Pings, `None` when disabled.
    pub ping_interval: Option<Duration>,
    /// Silence after which the viewer is dropped.
    pub pong_timeout: Duration,
}

impl From<&ServerConfig> for Heartbeat {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
        }
    }
}

/// Drive a viewer's socket until it closes.
///
/// 1. Forwards queued JSON from `rx` as Text frames
/// 2. Sends periodic Pings and drops viewers that stop answering
/// 3. Ignores inbound payloads, treating any frame as liveness
/// 4. Reports the disconnect to the coordinator exactly once
#[instrument(skip_all, fields(viewer_id = %connection.id, product_id = %connection.product_id))]
pub async fn run_viewer_session(
    ws: WebSocket,
    connection: Arc<ViewerConnection>,
    mut rx: mpsc::Receiver<Arc<String>>,
    coordinator: Arc<BroadcastCoordinator>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let outbound_conn = Arc::clone(&connection);
    let mut outbound = tokio::spawn(async move {
        let ping_enabled = heartbeat.ping_interval.is_some();
        let mut ping_interval =
            tokio::time::interval(heartbeat.ping_interval.unwrap_or(Duration::from_secs(3600)));
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick(), if ping_enabled => {
                    if outbound_conn.is_stale(heartbeat.pong_timeout) {
                        warn!("viewer unresponsive for {:?}, disconnecting", heartbeat.pong_timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) => {
                        debug!("viewer sent close frame");
                        break;
                    }
                    // Payloads are ignored; any frame proves liveness.
                    Some(Ok(_)) => connection.touch(),
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read error");
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut outbound => break,
        }
    }

    outbound.abort();
    if let Some(count) = coordinator.on_disconnect(&connection).await {
        info!(count, skipped = connection.skipped_frames(), "session ended");
    }
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}
