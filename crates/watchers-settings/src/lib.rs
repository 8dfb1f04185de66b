//! # watchers-settings
//!
//! Configuration for the watchers server with layered sources.
//!
//! Precedence, lowest first: compiled defaults, JSON settings file,
//! `WATCHERS_*` environment variables, then the bare `PORT` variable.
//! CLI flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{DEFAULT_SETTINGS_PATH, load_settings, load_settings_from_path};
pub use types::{BroadcastScope, BroadcastSettings, LoggingSettings, ServerSettings, WatchersSettings};
