//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the shield.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::security::rate_limit::{FailurePolicy, RateLimitPolicy};

/// Root configuration for the request shield.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// CORS allow-list.
    pub cors: CorsConfig,

    /// Token verification settings.
    pub auth: AuthConfig,

    /// Audit trail and alerting.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request size limits.
    pub limits: LimitsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Reverse proxies whose `X-Forwarded-For` / `X-Real-IP` are believed
    /// when keying rate limits. Empty means the socket peer is always used.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Timeout configuration for the pipeline's suspension points.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for request/response in seconds.
    pub request_secs: u64,

    /// Upper bound on a token verification call. Expiry fails closed.
    pub token_verify_ms: u64,

    /// Upper bound on an audit store write. Expiry is logged and swallowed.
    pub audit_write_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            token_verify_ms: 2_000,
            audit_write_ms: 2_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// What to do when the counter store is unavailable.
    pub on_store_failure: FailurePolicy,

    /// How often expired windows are swept from the in-memory store.
    pub sweep_interval_secs: u64,

    /// How long an expired window lingers before it may be evicted.
    pub eviction_grace_secs: u64,

    /// Named presets. Entries here override the built-in ones.
    pub presets: HashMap<String, RateLimitPolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_store_failure: FailurePolicy::Closed,
            sweep_interval_secs: 60,
            eviction_grace_secs: 60,
            presets: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Resolve a preset by name, configured presets first, then built-ins.
    pub fn preset(&self, name: &str) -> Option<RateLimitPolicy> {
        self.presets
            .get(name)
            .copied()
            .or_else(|| RateLimitPolicy::builtin(name))
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins echoed back in `Access-Control-Allow-Origin`. Exact match.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret. When set, bearer tokens are verified as JWTs.
    pub jwt_secret: Option<String>,

    /// Fixed token table, used when no JWT secret is configured.
    pub static_tokens: Vec<StaticTokenConfig>,
}

/// A single entry of the static token table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticTokenConfig {
    pub token: String,
    pub id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines file receiving entries. In-memory store when unset.
    pub log_path: Option<String>,

    /// Webhook receiving CRITICAL alerts. Alerts go to the log when unset.
    pub alert_webhook_url: Option<String>,

    /// Bounded queue between the logger and the alert worker.
    pub alert_queue_capacity: usize,

    /// Record 400 rejections at LOW severity.
    pub log_validation_failures: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            alert_webhook_url: None,
            alert_queue_capacity: 256,
            log_validation_failures: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: crate::security::limits::DEFAULT_MAX_BODY_BYTES,
        }
    }
}
