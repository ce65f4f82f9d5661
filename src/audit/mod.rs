//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! Security event (rejection, declared action, handler failure)
//!     → types.rs (AuditEvent → AuditLogEntry: severity, client, id, time)
//!     → logger.rs (bounded store write, fallback log on failure)
//!     → store.rs (memory or JSON-lines file, append-only)
//!     → alert.rs (CRITICAL only: bounded queue → background dispatcher)
//! ```
//!
//! # Design Decisions
//! - Severity comes from an exhaustive action → severity match
//! - The logger never returns an error; a broken store cannot fail a request
//! - Alerting never blocks the caller

pub mod alert;
pub mod logger;
pub mod store;
pub mod types;

pub use alert::{
    alert_channel, AlertDispatcher, AlertError, AlertQueue, AlertWorker, LogAlertDispatcher,
    WebhookAlertDispatcher,
};
pub use logger::AuditLogger;
pub use store::{AuditStore, JsonlAuditStore, MemoryAuditStore, StoreError};
pub use types::{AuditAction, AuditEvent, AuditFilter, AuditLogEntry, AuditSeverity, ClientContext};
