//! Alert dispatch for CRITICAL audit entries.
//!
//! # Data Flow
//! ```text
//! AuditLogger::record (CRITICAL)
//!     → AlertQueue::enqueue (bounded, never waits)
//!     → AlertWorker (background task)
//!     → AlertDispatcher::send (log line or webhook)
//! ```
//!
//! # Design Decisions
//! - A full or closed queue drops the alert with a warning
//! - Dispatch failures are logged and counted; the worker keeps running

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::audit::types::AuditLogEntry;
use crate::observability::metrics;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("alert endpoint answered {0}")]
    Rejected(u16),
}

/// Best-effort delivery of one alert.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn send(&self, entry: &AuditLogEntry) -> Result<(), AlertError>;
}

/// Writes alerts to the log at ERROR level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertDispatcher;

#[async_trait]
impl AlertDispatcher for LogAlertDispatcher {
    async fn send(&self, entry: &AuditLogEntry) -> Result<(), AlertError> {
        tracing::error!(
            target: "security_alert",
            id = %entry.id,
            action = %entry.action,
            severity = %entry.severity,
            user_id = entry.user_id.as_deref().unwrap_or("-"),
            ip_address = %entry.ip_address,
            "Critical security event"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: String,
    entry: &'a AuditLogEntry,
}

/// POSTs alerts as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookAlertDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertDispatcher {
    pub fn new(url: impl Into<String>) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertDispatcher for WebhookAlertDispatcher {
    async fn send(&self, entry: &AuditLogEntry) -> Result<(), AlertError> {
        let payload = WebhookPayload {
            text: format!(
                "[{}] {} from {}",
                entry.severity, entry.action, entry.ip_address
            ),
            entry,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AlertError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Producer side of the alert queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<AuditLogEntry>,
}

impl AlertQueue {
    /// Hand an entry to the worker without waiting. Returns whether it was queued.
    pub fn enqueue(&self, entry: AuditLogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tracing::warn!(id = %entry.id, action = %entry.action, "Alert queue full, alert dropped");
                metrics::record_alert("dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                tracing::warn!(id = %entry.id, action = %entry.action, "Alert worker stopped, alert dropped");
                metrics::record_alert("dropped");
                false
            }
        }
    }
}

/// Consumer side: drains the queue into a dispatcher.
pub struct AlertWorker {
    rx: mpsc::Receiver<AuditLogEntry>,
    dispatcher: Arc<dyn AlertDispatcher>,
}

/// Build a bounded queue and the worker that drains it.
pub fn alert_channel(capacity: usize, dispatcher: Arc<dyn AlertDispatcher>) -> (AlertQueue, AlertWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (AlertQueue { tx }, AlertWorker { rx, dispatcher })
}

impl AlertWorker {
    /// Dispatch until shutdown or until every queue handle is dropped.
    /// Alerts already queued at shutdown are still delivered.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(entry) => self.dispatch(&entry).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    self.rx.close();
                    while let Some(entry) = self.rx.recv().await {
                        self.dispatch(&entry).await;
                    }
                    break;
                }
            }
        }
        tracing::info!("Alert worker stopped");
    }

    async fn dispatch(&self, entry: &AuditLogEntry) {
        match self.dispatcher.send(entry).await {
            Ok(()) => metrics::record_alert("sent"),
            Err(e) => {
                tracing::error!(id = %entry.id, action = %entry.action, error = %e, "Alert dispatch failed");
                metrics::record_alert("failed");
            }
        }
    }
}
