//! Settings loading with layered sources.
//!
//! Loading flow:
//! 1. Start with compiled [`WatchersSettings::default()`]
//! 2. Merge the JSON settings file, if it exists
//! 3. Merge `WATCHERS_*` environment variables (`__` separates sections,
//!    e.g. `WATCHERS_SERVER__PORT=8080`, `WATCHERS_BROADCAST__SCOPE=all`)
//! 4. Merge the bare `PORT` variable into `server.port`
//! 5. Validate

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::WatchersSettings;

/// Settings file consulted when no path is given.
pub const DEFAULT_SETTINGS_PATH: &str = "./watchers.json";

/// Load settings from [`DEFAULT_SETTINGS_PATH`] with env var overrides.
pub fn load_settings() -> Result<WatchersSettings> {
    load_settings_from_path(Path::new(DEFAULT_SETTINGS_PATH))
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file is not an error; the remaining layers still apply.
/// A file with invalid JSON or mistyped values is.
pub fn load_settings_from_path(path: &Path) -> Result<WatchersSettings> {
    if path.exists() {
        debug!(?path, "loading settings from file");
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let settings: WatchersSettings = figment(path).extract()?;
    validate(&settings)?;
    Ok(settings)
}

/// The provider stack, exposed for callers that layer CLI flags on top.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WatchersSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed("WATCHERS_").split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
}

/// Reject combinations the server cannot run with.
pub fn validate(settings: &WatchersSettings) -> Result<()> {
    let server = &settings.server;
    // One slot is reserved for the welcome, one takes the viewer's own update.
    if server.send_queue_capacity < 2 {
        return Err(SettingsError::InvalidValue(format!(
            "server.send_queue_capacity ({}) must be at least 2",
            server.send_queue_capacity
        )));
    }
    if server.ping_interval_secs > 0 && server.pong_timeout_secs < server.ping_interval_secs {
        return Err(SettingsError::InvalidValue(format!(
            "server.pong_timeout_secs ({}) must not be shorter than server.ping_interval_secs ({})",
            server.pong_timeout_secs, server.ping_interval_secs
        )));
    }
    Ok(())
}
