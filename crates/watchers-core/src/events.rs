//! Server → viewer JSON payloads.
//!
//! Two shapes go over the wire:
//!
//! - `{"productId": "...", "count": N}`: broadcast on every count change
//! - `{"message": "...", "productId": "...", "count": N}`: sent once to a
//!   newly connected viewer, with the count after its own increment

use serde::{Deserialize, Serialize};

use crate::product::ProductId;

/// Greeting text carried by every [`Welcome`] payload.
pub const WELCOME_MESSAGE: &str = "Connected to the websocket server";

/// A product's watcher count changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountUpdate {
    /// Product whose count changed.
    pub product_id: ProductId,
    /// Count after the change.
    pub count: usize,
}

impl CountUpdate {
    /// Build an update for `product_id`.
    pub fn new(product_id: ProductId, count: usize) -> Self {
        Self { product_id, count }
    }
}

/// One-time snapshot sent to a viewer right after it connects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    /// Always [`WELCOME_MESSAGE`].
    pub message: String,
    /// Product the viewer subscribed to.
    pub product_id: ProductId,
    /// Count including the new viewer.
    pub count: usize,
}

impl Welcome {
    /// Build a welcome for `product_id` with the post-increment count.
    pub fn new(product_id: ProductId, count: usize) -> Self {
        Self {
            message: WELCOME_MESSAGE.to_owned(),
            product_id,
            count,
        }
    }
}
