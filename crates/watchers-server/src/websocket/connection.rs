//! A single viewer's connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use watchers_core::{ProductId, ViewerId};

/// Lifecycle of a viewer session. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted and counted in the registry.
    Open,
    /// Disconnected; already decremented.
    Closed,
}

/// One connected viewer, bound to a single product for its lifetime.
pub struct ViewerConnection {
    /// Connection ID, unique per socket.
    pub id: ViewerId,
    /// Product this viewer watches.
    pub product_id: ProductId,
    /// Drained by the session's socket writer.
    outbound: mpsc::Sender<Arc<String>>,
    open: AtomicBool,
    /// Set at accept time.
    pub connected_at: Instant,
    last_seen: Mutex<Instant>,
    skipped: AtomicU64,
}

impl ViewerConnection {
    /// Create an Open connection.
    pub fn new(id: ViewerId, product_id: ProductId, outbound: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            product_id,
            outbound,
            open: AtomicBool::new(true),
            connected_at: now,
            last_seen: Mutex::new(now),
            skipped: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.open.load(Ordering::Acquire) {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Transition Open → Closed.
    ///
    /// Returns `true` only for the call that performed the transition, so
    /// duplicate close events can be told apart from the first one.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Whether an update queued now would be accepted: Open, the writer
    /// still draining, and room in the queue.
    pub fn is_writable(&self) -> bool {
        self.state() == SessionState::Open
            && !self.outbound.is_closed()
            && self.outbound.capacity() > 0
    }

    /// Queue a serialized frame without waiting.
    ///
    /// A full or closed queue rejects the frame; it is counted, not retried.
    pub fn enqueue(&self, frame: Arc<String>) -> bool {
        let accepted = self.outbound.try_send(frame).is_ok();
        if !accepted {
            let _ = self.skipped.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Serialize `payload` and queue it.
    pub fn enqueue_json<T: Serialize>(&self, payload: &T) -> bool {
        serde_json::to_string(payload).is_ok_and(|json| self.enqueue(Arc::new(json)))
    }

    /// Frames rejected by [`enqueue`](Self::enqueue).
    pub fn skipped_frames(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Record inbound activity (any frame, including Pong).
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the viewer was last heard from.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Silent for longer than `timeout`.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    /// Time since accept.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
