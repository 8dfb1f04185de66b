//! Viewer connection state, session lifecycle, and count broadcasting.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | One viewer: product, outbound queue, Open/Closed state, liveness |
//! | `coordinator` | Connect/disconnect handling, registry mutation, policy fan-out |
//! | `session` | Socket read/write loops from upgrade through disconnect |
//!
//! ## Data Flow
//!
//! upgrade → `coordinator::accept` (increment + broadcast + welcome) →
//! `session` forwards queued JSON to the socket → close →
//! `coordinator::on_disconnect` (decrement + broadcast).

pub mod connection;
pub mod coordinator;
pub mod session;
