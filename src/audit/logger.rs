//! The audit logger: severity resolution, persistence, alerting.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::alert::AlertQueue;
use crate::audit::store::{AuditStore, StoreError};
use crate::audit::types::{AuditEvent, AuditFilter, AuditLogEntry, AuditSeverity, ClientContext};
use crate::observability::logging::AUDIT_FALLBACK_TARGET;
use crate::observability::metrics;

/// Records audit events. Never fails back into request handling.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    alerts: Option<AlertQueue>,
    write_timeout: Duration,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, write_timeout: Duration) -> Self {
        Self {
            store,
            alerts: None,
            write_timeout,
        }
    }

    /// Route CRITICAL entries to `queue`.
    pub fn with_alerts(mut self, queue: AlertQueue) -> Self {
        self.alerts = Some(queue);
        self
    }

    /// Persist `event` and return the entry as recorded.
    ///
    /// The store write is awaited (bounded by the write timeout) before this
    /// returns. A failed or timed-out write goes to the fallback log target
    /// instead. CRITICAL entries are queued for alerting either way.
    pub async fn record(&self, event: AuditEvent, client: Option<&ClientContext>) -> AuditLogEntry {
        let entry = event.into_entry(client);

        match tokio::time::timeout(self.write_timeout, self.store.append(&entry)).await {
            Ok(Ok(())) => {
                metrics::record_audit_write("ok");
                tracing::debug!(id = %entry.id, action = %entry.action, severity = %entry.severity, "Audit entry stored");
            }
            Ok(Err(e)) => {
                metrics::record_audit_write("failed");
                write_fallback(&entry, &e.to_string());
            }
            Err(_) => {
                metrics::record_audit_write("timeout");
                write_fallback(&entry, "audit store write timed out");
            }
        }

        if entry.severity == AuditSeverity::Critical {
            match &self.alerts {
                Some(queue) => {
                    queue.enqueue(entry.clone());
                }
                None => tracing::warn!(
                    id = %entry.id,
                    action = %entry.action,
                    "Critical audit entry with no alert queue configured"
                ),
            }
        }

        entry
    }

    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.store.query(filter).await
    }
}

fn write_fallback(entry: &AuditLogEntry, reason: &str) {
    let serialized = serde_json::to_string(entry)
        .unwrap_or_else(|e| format!("{{\"unserializable\":\"{e}\"}}"));
    tracing::error!(
        target: AUDIT_FALLBACK_TARGET,
        reason,
        entry = %serialized,
        "Audit store write failed; entry preserved in log"
    );
}
