//! Stop signal for the listener and every viewer session.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

/// Default time allowed for viewer sessions to wind down.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Signals shutdown to the listener and every viewer session, then waits for
/// the sessions to finish their disconnect handling.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Coordinator with no sessions tracked yet.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Token handed to the listener and each session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every holder of [`token`](Self::token). Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// New upgrades are refused once this is true.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Guard that keeps shutdown waiting until it is dropped.
    ///
    /// Take it before the upgrade completes so a session that is still
    /// registering is never missed.
    pub fn session_guard(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions still running.
    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel the token, then wait up to `timeout` for tracked sessions.
    ///
    /// Returns `true` if every session finished in time.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            session_count = self.tracked_sessions(),
            timeout_secs = timeout.as_secs(),
            "waiting for viewer sessions to close"
        );

        if tokio::time::timeout(timeout, self.sessions.wait()).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some sessions may still be running");
            false
        } else {
            true
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
