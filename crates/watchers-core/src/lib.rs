//! # watchers-core
//!
//! Foundation types for live product watcher counts.
//!
//! - **Product IDs**: `ProductId` newtype and `extract_product_id` for connection paths
//! - **Viewer IDs**: `ViewerId`, one per live transport connection
//! - **Presence registry**: `PresenceRegistry` mapping product → active viewer count
//! - **Wire payloads**: `CountUpdate` (broadcast) and `Welcome` (sent once on connect)

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod product;
pub mod registry;

pub use events::{CountUpdate, WELCOME_MESSAGE, Welcome};
pub use ids::ViewerId;
pub use product::{InvalidProductId, ProductId, extract_product_id};
pub use registry::PresenceRegistry;
