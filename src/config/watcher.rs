//! Configuration file watcher for hot reload.
//!
//! Only the CORS allow-list is applied live. Other sections are read at
//! startup; a reload that changes them is accepted but logged as pending a
//! restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ShieldConfig;

/// Watches one config file and forwards validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ShieldConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ShieldConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    ///
    /// The parent directory is watched rather than the file so editors that
    /// replace the file by rename are still seen.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(result) = reload_on(&event, &watched) {
                        match result {
                            Ok(config) => {
                                let _ = update_tx.send(config);
                            }
                            Err(e) => tracing::error!(
                                error = %e,
                                "Config reload rejected, keeping current configuration"
                            ),
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

/// Reload when `event` touches `path`; `None` for unrelated events.
fn reload_on(event: &Event, path: &Path) -> Option<Result<ShieldConfig, ConfigError>> {
    let relevant = (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == path.file_name());
    if !relevant {
        return None;
    }
    tracing::info!(path = ?path, "Config file changed, reloading");
    Some(load_config(path))
}
