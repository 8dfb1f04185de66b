//! Runtime configuration for `WatchersServer`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use watchers_settings::{BroadcastScope, WatchersSettings};

/// Who is told about a count change, and when.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastPolicy {
    /// Recipient selection.
    pub scope: BroadcastScope,
    /// Broadcast the decremented count when a viewer leaves.
    pub on_disconnect: bool,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            scope: BroadcastScope::Product,
            on_disconnect: true,
        }
    }
}

/// Configuration for the watchers server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind. Loopback unless settings say otherwise.
    pub host: String,
    /// `0` lets the OS pick, which tests rely on.
    pub port: u16,
    /// Maximum concurrent viewer connections (`0` = unlimited).
    pub max_connections: usize,
    /// Outbound queue capacity per viewer.
    pub send_queue_capacity: usize,
    /// Ping interval in seconds (`0` disables pings).
    pub ping_interval_secs: u64,
    /// Close a viewer after this many seconds without a Pong.
    pub pong_timeout_secs: u64,
    /// Broadcast policy.
    pub broadcast: BroadcastPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 0,
            send_queue_capacity: 64,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            broadcast: BroadcastPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &WatchersSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            send_queue_capacity: server.send_queue_capacity,
            ping_interval_secs: server.ping_interval_secs,
            pong_timeout_secs: server.pong_timeout_secs,
            broadcast: BroadcastPolicy {
                scope: settings.broadcast.scope,
                on_disconnect: settings.broadcast.on_disconnect,
            },
        }
    }

    /// Ping interval, or `None` when pings are disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    /// Maximum silence tolerated from a viewer.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
