//! Request shield server.
//!
//! ```text
//!     Client Request
//!     ──▶ request id ─▶ trace ─▶ edge (CORS preflight, hardening)
//!                                  │
//!                                  ▼
//!                            axum routing
//!                                  │
//!                                  ▼
//!         guard: rate limit ─▶ auth ─▶ roles ─▶ validate ─▶ handler
//!                  │            │        │          │          │
//!                  └────────────┴────────┴──────────┴──────────┘
//!                                  │
//!                                  ▼
//!                     audit logger ─▶ store (memory / JSONL)
//!                                  └─▶ alert queue (CRITICAL) ─▶ dispatcher
//! ```
//!
//! Usage: `request-shield [config.toml]`. Without a path the built-in
//! defaults are used and no file is watched.

use std::path::PathBuf;

use request_shield::config::{load_config, watcher::ConfigWatcher, ShieldConfig};
use request_shield::http::HttpServer;
use request_shield::lifecycle::{signals, Shutdown};
use request_shield::observability::{logging, metrics};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("request-shield v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        config_path = ?config_path,
        rate_limiting = config.rate_limit.enabled,
        origins = config.cors.allowed_origins.len(),
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

    // Keep the watcher alive for the lifetime of the server.
    let (config_updates, _watcher) = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::from_config(config).await?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
