//! Presence registry: product → number of live viewers.
//!
//! A key is present only while its count is above zero. Every
//! read-modify-write runs under one mutex, so concurrent increments and
//! decrements from independent connections never lose updates and
//! [`PresenceRegistry::size`] never observes a half-applied change.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::product::ProductId;

/// In-memory watcher counts, shared by every connection of the process.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    counts: Mutex<HashMap<ProductId, usize>>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one watcher to `product` and return the new count.
    pub fn increment(&self, product: &ProductId) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(product.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        trace!(product_id = %product, count, "watcher added");
        count
    }

    /// Remove one watcher from `product` and return the new count.
    ///
    /// The count floors at zero and the entry is dropped as soon as it
    /// reaches zero. Decrementing an absent product creates nothing.
    pub fn decrement(&self, product: &ProductId) -> usize {
        let mut counts = self.counts.lock();
        let Some(count) = counts.get_mut(product) else {
            trace!(product_id = %product, "decrement on absent product");
            return 0;
        };
        *count = count.saturating_sub(1);
        let count = *count;
        if count == 0 {
            let _ = counts.remove(product);
        }
        trace!(product_id = %product, count, "watcher removed");
        count
    }

    /// Current count for `product` (0 when nobody is watching).
    pub fn count(&self, product: &ProductId) -> usize {
        self.counts.lock().get(product).copied().unwrap_or(0)
    }

    /// Number of products with at least one watcher.
    pub fn size(&self) -> usize {
        self.counts.lock().len()
    }

    /// Point-in-time copy of all counts, sorted by product ID.
    pub fn snapshot(&self) -> Vec<(ProductId, usize)> {
        let mut entries: Vec<_> = self
            .counts
            .lock()
            .iter()
            .map(|(product, count)| (product.clone(), *count))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
