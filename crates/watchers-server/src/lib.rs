//! # watchers-server
//!
//! Axum HTTP + `WebSocket` server that tracks how many viewers are watching
//! each product and pushes count changes to them.
//!
//! - `WebSocket` gateway: any upgrade whose path ends in a product ID opens a viewer session
//! - Broadcast coordinator: registry mutations and policy-driven fan-out
//! - HTTP endpoints: `/health` diagnostics, `/metrics` Prometheus scrape
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
