//! header-shield edge server.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌────────────────────────────────────────────────────┐
//!                   │                   HEADER SHIELD                    │
//!  Client Request   │  ┌─────────┐   ┌─────────┐   ┌──────────────────┐  │
//!  ─────────────────┼─▶│ context │──▶│ limits  │──▶│ guards           │──┼──▶ Renderer
//!                   │  │ resolve │   │ (rate)  │   │ size/method/xss/ │  │
//!                   │  │ + nonce │   └─────────┘   │ basic auth       │  │
//!                   │  └─────────┘                 └──────────────────┘  │
//!  Client Response  │  ┌──────────────┐   ┌──────────────────────────┐   │
//!  ◀────────────────┼──│ headers      │◀──│ document rewrite         │◀──┼─── Renderer
//!                   │  │ (CSP, HSTS…) │   │ SRI → nonce | CSP hashes │   │
//!                   │  └──────────────┘   └──────────────────────────┘   │
//!                   └────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `header-shield [CONFIG]` (default `shield.toml`; built-in
//! defaults when the file does not exist).

use std::path::PathBuf;

use tokio::net::TcpListener;

use header_shield::config::{load_config, watcher::ConfigWatcher, ShieldConfig};
use header_shield::http::HttpServer;
use header_shield::lifecycle::{signals, Shutdown};
use header_shield::observability::{logging, metrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("shield.toml"));

    let config_exists = config_path.exists();
    let config = if config_exists {
        load_config(&config_path)?
    } else {
        ShieldConfig::default()
    };

    logging::init(&config.observability.log_level);
    tracing::info!("header-shield v{} starting", env!("CARGO_PKG_VERSION"));
    if !config_exists {
        tracing::warn!(path = %config_path.display(), "Config file not found, using built-in defaults");
    }

    tracing::info!(
        bind_address = %config.server.bind_address,
        upstream = %config.server.upstream,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let (watcher, config_updates) = ConfigWatcher::new(&config_path);
    // Dropping the watcher stops notifications; keep it for the whole run.
    let _watcher = if config_exists {
        match watcher.run() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Config hot reload disabled");
                None
            }
        }
    } else {
        None
    };

    let shutdown = Shutdown::new();
    signals::forward_to(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
