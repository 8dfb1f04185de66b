//! Broadcast coordinator: turns viewer connects and disconnects into
//! registry mutations and fans the resulting counts out to live viewers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use watchers_core::{
    CountUpdate, PresenceRegistry, ProductId, ViewerId, Welcome, extract_product_id,
};
use watchers_settings::BroadcastScope;

use super::connection::ViewerConnection;
use crate::config::BroadcastPolicy;
use crate::metrics::{
    WATCHERS_ACTIVE_PRODUCTS, WS_BROADCAST_SKIPS_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_REJECTED_TOTAL, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Owns the live viewer set and decides who hears about each count change.
pub struct BroadcastCoordinator {
    registry: Arc<PresenceRegistry>,
    policy: BroadcastPolicy,
    /// Open viewers indexed by connection ID.
    sessions: RwLock<HashMap<ViewerId, Arc<ViewerConnection>>>,
    /// Mirrors `sessions.len()` so diagnostics never wait on the lock.
    active_count: AtomicUsize,
}

impl BroadcastCoordinator {
    /// Create a coordinator over an injected registry.
    pub fn new(registry: Arc<PresenceRegistry>, policy: BroadcastPolicy) -> Self {
        Self {
            registry,
            policy,
            sessions: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Product a connection target refers to.
    ///
    /// Logs and counts the rejection when the path carries no product ID.
    pub fn resolve_target(&self, path: &str) -> Option<ProductId> {
        let product_id = extract_product_id(path);
        if product_id.is_none() {
            warn!(path, "connection has no product id, not tracking");
            counter!(WS_CONNECTIONS_REJECTED_TOTAL, "reason" => "malformed_target").increment(1);
        }
        product_id
    }

    /// Handle a new transport connection to `path`.
    ///
    /// Returns `None` without touching any state when the path carries no
    /// product ID.
    pub async fn on_connect(
        &self,
        path: &str,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Option<Arc<ViewerConnection>> {
        let product_id = self.resolve_target(path)?;
        Some(self.accept(product_id, tx).await)
    }

    /// Register a viewer for an already-extracted product.
    ///
    /// 1. Reserves a queue slot for the viewer's welcome
    /// 2. Adds an Open session to the live set
    /// 3. Increments the product's count
    /// 4. Broadcasts the new count per the policy
    /// 5. Sends the welcome with the post-increment count
    pub async fn accept(
        &self,
        product_id: ProductId,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Arc<ViewerConnection> {
        // Taken before the viewer is visible to other broadcasts.
        let welcome_slot = tx.clone().try_reserve_owned().ok();
        let connection = Arc::new(ViewerConnection::new(ViewerId::new(), product_id, tx));
        self.add(Arc::clone(&connection)).await;

        let product_id = &connection.product_id;
        let count = self.registry.increment(product_id);
        self.record_active_products();
        info!(
            viewer_id = %connection.id,
            product_id = %product_id,
            count,
            "viewer connected"
        );

        let _ = self
            .broadcast(&CountUpdate::new(product_id.clone(), count))
            .await;

        let welcome = serde_json::to_string(&Welcome::new(product_id.clone(), count));
        match (welcome_slot, welcome) {
            (Some(slot), Ok(json)) => {
                let _ = slot.send(Arc::new(json));
            }
            (None, _) => debug!(viewer_id = %connection.id, "welcome skipped, viewer not writable"),
            (Some(_), Err(e)) => {
                warn!(viewer_id = %connection.id, error = %e, "failed to serialize welcome");
            }
        }

        connection
    }

    /// Handle a viewer's transport closing.
    ///
    /// Returns the product's new count, or `None` if this session was
    /// already closed (duplicate close events never decrement twice).
    pub async fn on_disconnect(&self, connection: &ViewerConnection) -> Option<usize> {
        if !connection.close() {
            debug!(viewer_id = %connection.id, "duplicate disconnect ignored");
            return None;
        }
        self.remove(&connection.id).await;

        let product_id = &connection.product_id;
        let count = self.registry.decrement(product_id);
        self.record_active_products();
        info!(
            viewer_id = %connection.id,
            product_id = %product_id,
            count,
            "viewer disconnected"
        );

        if self.policy.on_disconnect {
            let _ = self
                .broadcast(&CountUpdate::new(product_id.clone(), count))
                .await;
        }
        Some(count)
    }

    /// Push a count update to every recipient the policy selects.
    ///
    /// Viewers that are not writable are skipped, never retried. Returns the
    /// number of viewers the update was queued for.
    pub async fn broadcast(&self, update: &CountUpdate) -> usize {
        let json = match serde_json::to_string(update) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(product_id = %update.product_id, error = %e, "failed to serialize count update");
                return 0;
            }
        };

        let sessions = self.sessions.read().await;
        let mut delivered = 0usize;
        let mut skipped = 0u64;
        for conn in sessions.values() {
            if !self.is_recipient(conn, &update.product_id) {
                continue;
            }
            if conn.is_writable() && conn.enqueue(Arc::clone(&json)) {
                delivered += 1;
            } else {
                skipped += 1;
            }
        }
        drop(sessions);

        if skipped > 0 {
            counter!(WS_BROADCAST_SKIPS_TOTAL).increment(skipped);
        }
        debug!(
            product_id = %update.product_id,
            count = update.count,
            delivered,
            skipped,
            "broadcast count update"
        );
        delivered
    }

    /// Number of Open viewer sessions.
    pub fn session_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Number of products with at least one watcher.
    pub fn active_products(&self) -> usize {
        self.registry.size()
    }

    /// The registry this coordinator mutates.
    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// The broadcast policy in effect.
    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    fn is_recipient(&self, conn: &ViewerConnection, product_id: &ProductId) -> bool {
        match self.policy.scope {
            BroadcastScope::All => true,
            BroadcastScope::Product => &conn.product_id == product_id,
        }
    }

    async fn add(&self, connection: Arc<ViewerConnection>) {
        let mut sessions = self.sessions.write().await;
        if sessions.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
            counter!(WS_CONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        }
    }

    async fn remove(&self, viewer_id: &ViewerId) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(viewer_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_active_products(&self) {
        gauge!(WATCHERS_ACTIVE_PRODUCTS).set(self.registry.size() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use watchers_core::WELCOME_MESSAGE;

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    fn coordinator(scope: BroadcastScope, on_disconnect: bool) -> BroadcastCoordinator {
        BroadcastCoordinator::new(
            Arc::new(PresenceRegistry::new()),
            BroadcastPolicy {
                scope,
                on_disconnect,
            },
        )
    }

    async fn connect(
        coord: &BroadcastCoordinator,
        path: &str,
    ) -> (Arc<ViewerConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = coord.on_connect(path, tx).await.expect("path has a product id");
        (conn, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(serde_json::from_str(&msg).unwrap());
        }
        out
    }

    fn update(product: &str, count: usize) -> Value {
        serde_json::json!({"productId": product, "count": count})
    }

    fn welcome(product: &str, count: usize) -> Value {
        serde_json::json!({"message": WELCOME_MESSAGE, "productId": product, "count": count})
    }

    #[tokio::test]
    async fn malformed_target_creates_nothing() {
        let coord = coordinator(BroadcastScope::All, true);
        let (tx, mut rx) = mpsc::channel(16);
        assert!(coord.on_connect("/watch/", tx).await.is_none());
        assert_eq!(coord.session_count(), 0);
        assert_eq!(coord.active_products(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn first_viewer_gets_update_then_welcome() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (_a, mut rx_a) = connect(&coord, "/watch/sku-1").await;
        assert_eq!(drain(&mut rx_a), vec![update("sku-1", 1), welcome("sku-1", 1)]);
        assert_eq!(coord.session_count(), 1);
        assert_eq!(coord.registry().count(&pid("sku-1")), 1);
    }

    #[tokio::test]
    async fn second_viewer_same_product() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (_a, mut rx_a) = connect(&coord, "/watch/sku-1").await;
        let _ = drain(&mut rx_a);

        let (_b, mut rx_b) = connect(&coord, "/watch/sku-1").await;
        assert_eq!(drain(&mut rx_a), vec![update("sku-1", 2)]);
        assert_eq!(drain(&mut rx_b), vec![update("sku-1", 2), welcome("sku-1", 2)]);
    }

    #[tokio::test]
    async fn all_scope_reaches_other_products() {
        let coord = coordinator(BroadcastScope::All, true);
        let (_a, mut rx_a) = connect(&coord, "/watch/sku-1").await;
        let _ = drain(&mut rx_a);

        let (_b, mut rx_b) = connect(&coord, "/watch/sku-2").await;
        assert_eq!(drain(&mut rx_a), vec![update("sku-2", 1)]);
        assert_eq!(drain(&mut rx_b), vec![update("sku-2", 1), welcome("sku-2", 1)]);
    }

    #[tokio::test]
    async fn product_scope_isolates_other_products() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (_a, mut rx_a) = connect(&coord, "/watch/sku-1").await;
        let _ = drain(&mut rx_a);

        let (_b, _rx_b) = connect(&coord, "/watch/sku-2").await;
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn disconnect_broadcasts_decrement() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (_a, mut rx_a) = connect(&coord, "/watch/sku-1").await;
        let (b, _rx_b) = connect(&coord, "/watch/sku-1").await;
        let _ = drain(&mut rx_a);

        assert_eq!(coord.on_disconnect(&b).await, Some(1));
        assert_eq!(drain(&mut rx_a), vec![update("sku-1", 1)]);
        assert_eq!(coord.session_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_without_broadcast_policy() {
        let coord = coordinator(BroadcastScope::All, false);
        let (_a, mut rx_a) = connect(&coord, "/watch/sku-1").await;
        let (b, _rx_b) = connect(&coord, "/watch/sku-1").await;
        let _ = drain(&mut rx_a);

        assert_eq!(coord.on_disconnect(&b).await, Some(1));
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(coord.registry().count(&pid("sku-1")), 1);
    }

    #[tokio::test]
    async fn last_viewer_leaving_removes_product() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (a, _rx_a) = connect(&coord, "/watch/sku-3").await;
        let (_other, _rx_o) = connect(&coord, "/watch/sku-4").await;
        assert_eq!(coord.active_products(), 2);

        assert_eq!(coord.on_disconnect(&a).await, Some(0));
        assert_eq!(coord.active_products(), 1);
        assert_eq!(coord.registry().count(&pid("sku-3")), 0);
    }

    #[tokio::test]
    async fn duplicate_disconnect_decrements_once() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (a, _rx_a) = connect(&coord, "/watch/sku-1").await;
        let (b, _rx_b) = connect(&coord, "/watch/sku-1").await;

        assert_eq!(coord.on_disconnect(&b).await, Some(1));
        assert_eq!(coord.on_disconnect(&b).await, None);
        assert_eq!(coord.registry().count(&pid("sku-1")), 1);
        assert_eq!(coord.session_count(), 1);
        drop(a);
    }

    #[tokio::test]
    async fn unwritable_viewer_is_skipped() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (_a, rx_a) = connect(&coord, "/watch/sku-1").await;
        drop(rx_a);

        let (_b, mut rx_b) = connect(&coord, "/watch/sku-1").await;
        let delivered = coord.broadcast(&CountUpdate::new(pid("sku-1"), 2)).await;
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut rx_b).len(), 3);
    }

    #[tokio::test]
    async fn full_queue_viewer_is_skipped() {
        let coord = coordinator(BroadcastScope::Product, true);
        let (tx, _rx) = mpsc::channel(2);
        let a = coord.on_connect("/watch/sku-1", tx).await.unwrap();
        // update + welcome fill the queue
        assert!(!a.is_writable());

        let delivered = coord.broadcast(&CountUpdate::new(pid("sku-1"), 1)).await;
        assert_eq!(delivered, 0);
        assert_eq!(a.skipped_frames(), 0);
    }

    #[tokio::test]
    async fn broadcast_to_empty_set() {
        let coord = coordinator(BroadcastScope::All, true);
        assert_eq!(coord.broadcast(&CountUpdate::new(pid("x"), 0)).await, 0);
    }

    #[tokio::test]
    async fn concurrent_connects_count_every_viewer() {
        let coord = Arc::new(coordinator(BroadcastScope::Product, true));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let coord = Arc::clone(&coord);
            handles.push(tokio::spawn(async move {
                let (tx, rx) = mpsc::channel(64);
                let conn = coord.on_connect("/watch/hot", tx).await.unwrap();
                (conn, rx)
            }));
        }
        let mut conns = Vec::new();
        for h in handles {
            conns.push(h.await.unwrap());
        }
        assert_eq!(coord.registry().count(&pid("hot")), 32);
        assert_eq!(coord.session_count(), 32);

        for (conn, _rx) in &conns {
            let _ = coord.on_disconnect(conn).await;
        }
        assert_eq!(coord.active_products(), 0);
        assert_eq!(coord.session_count(), 0);
    }

    #[tokio::test]
    async fn welcome_count_is_self_inclusive() {
        let coord = coordinator(BroadcastScope::Product, true);
        let mut rxs = Vec::new();
        for expected in 1..=5 {
            let (conn, mut rx) = connect(&coord, "/watch/sku-9").await;
            let msgs = drain(&mut rx);
            assert_eq!(msgs.last(), Some(&welcome("sku-9", expected)));
            rxs.push((conn, rx));
        }
    }

    #[test]
    fn resolve_target_takes_last_segment() {
        let coord = coordinator(BroadcastScope::Product, true);
        assert_eq!(coord.resolve_target("/shop/items/sku-7"), Some(pid("sku-7")));
        assert_eq!(coord.resolve_target("/watch/"), None);
        assert_eq!(coord.resolve_target(""), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn welcome_survives_concurrent_connects_on_small_queues() {
        let coord = Arc::new(coordinator(BroadcastScope::Product, true));
        let mut handles = Vec::new();
        for _ in 0..200 {
            let coord = Arc::clone(&coord);
            handles.push(tokio::spawn(async move {
                let (tx, rx) = mpsc::channel(2);
                let conn = coord.on_connect("/watch/hot", tx).await.unwrap();
                (conn, rx)
            }));
        }
        let mut viewers = Vec::new();
        for h in handles {
            viewers.push(h.await.unwrap());
        }

        for (conn, rx) in &mut viewers {
            let frames = drain(rx);
            assert!(
                frames.iter().any(|f| f["message"] == WELCOME_MESSAGE),
                "{} got no welcome: {frames:?}",
                conn.id
            );
        }
        assert_eq!(coord.registry().count(&pid("hot")), 200);
    }
}
