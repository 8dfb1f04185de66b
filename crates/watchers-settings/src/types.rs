//! Settings schema.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it overrides.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchersSettings {
    /// Listener and per-connection transport settings.
    pub server: ServerSettings,
    /// Who hears about count changes.
    pub broadcast: BroadcastSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener and transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent viewer connections (`0` = unlimited).
    pub max_connections: usize,
    /// Outbound messages buffered per viewer before sends are skipped.
    pub send_queue_capacity: usize,
    /// Seconds between server Ping frames (`0` disables pings).
    pub ping_interval_secs: u64,
    /// Seconds without a Pong before a viewer is dropped.
    pub pong_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            max_connections: 0,
            send_queue_capacity: 64,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
        }
    }
}

/// Which viewers receive a count change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastScope {
    /// Only viewers watching the product whose count changed.
    #[default]
    Product,
    /// Every connected viewer, regardless of product.
    All,
}

/// Broadcast policy settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    /// Recipient selection.
    pub scope: BroadcastScope,
    /// Whether a disconnect also broadcasts the decremented count.
    pub on_disconnect: bool,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            scope: BroadcastScope::Product,
            on_disconnect: true,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
