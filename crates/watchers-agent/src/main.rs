//! # watchers-agent
//!
//! Watchers server binary: loads configuration, sets up logging and
//! metrics, and runs the HTTP/WebSocket server until ctrl-c.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use watchers_server::config::ServerConfig;
use watchers_server::server::WatchersServer;
use watchers_settings::{DEFAULT_SETTINGS_PATH, WatchersSettings};

/// Live product watcher counts over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "watchers", about = "Live product watcher counts over WebSocket")]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply flags on top of loaded settings.
    fn apply(&self, settings: &mut WatchersSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // .env first so PORT and WATCHERS_* from it reach the settings loader
    let _ = dotenvy::dotenv();

    let mut settings = watchers_settings::load_settings_from_path(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    args.apply(&mut settings);

    logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics_handle = watchers_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = WatchersServer::new(ServerConfig::from_settings(&settings))
        .with_metrics(metrics_handle);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        scope = ?settings.broadcast.scope,
        "watchers listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server.shutdown().graceful_shutdown(None).await;
    let _ = handle.await;

    tracing::info!(drained, "Shutdown complete");
    Ok(())
}
