//! # extdev
//!
//! Extension development server binary: loads the built-in specifications,
//! starts the payload store and serves build state to dev clients over
//! WebSocket until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use extdev_server::{DevServer, ServerConfig};
use extdev_settings::{ExtDevSettings, LogLevel};
use extdev_specs::{builtin, load_from_providers};
use extdev_store::PayloadStore;
use extdev_store::store::DEFAULT_COMMAND_QUEUE;
use tracing_subscriber::EnvFilter;

/// Extension development server.
#[derive(Parser, Debug)]
#[command(name = "extdev", about = "Extension development server")]
struct Cli {
    /// Settings file (defaults to `~/.extdev/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Public URL clients connect through, e.g. a tunnel.
    #[arg(long)]
    public_url: Option<String>,

    /// Development store domain shown in preview links.
    #[arg(long)]
    store_fqdn: Option<String>,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut ExtDevSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref url) = self.public_url {
            settings.public_url = Some(url.clone());
        }
        if let Some(ref fqdn) = self.store_fqdn {
            settings.store_fqdn = Some(fqdn.clone());
        }
        if let Some(level) = self.log_level.as_deref().and_then(LogLevel::parse) {
            settings.log_level = level;
        }
        if self.log_json {
            settings.log_json = true;
        }
    }
}

fn init_tracing(settings: &ExtDevSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match args.config {
        Some(ref path) => extdev_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => extdev_settings::load_settings().context("Failed to load settings")?,
    };
    args.apply(&mut settings);
    extdev_settings::validate(&settings).context("Invalid settings")?;

    init_tracing(&settings);

    let metrics = extdev_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let specifications = load_from_providers(&builtin::all_providers())
        .await
        .context("Failed to load extension specifications")?;
    tracing::info!(count = specifications.len(), "extension specifications loaded");

    let (store, store_task) = PayloadStore::start(DEFAULT_COMMAND_QUEUE);

    let server = DevServer::new(
        ServerConfig::from(&settings),
        store.clone(),
        Arc::new(specifications),
    )
    .with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        %addr,
        websocket_url = %server.websocket_url(addr),
        "extension dev server ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().await;
    let _ = handle.await;
    store.close();
    let _ = store_task.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
