//! Fixed-window rate limiting.
//!
//! # Algorithm
//! Counters are keyed by `(client identity, endpoint)`. On each attempt the
//! window is reset if `now >= window_start + window_ms`, then the count is
//! incremented and the attempt admitted iff `count <= max_requests`. The
//! attempt that pushes the count over the limit is itself rejected.
//!
//! # Design Decisions
//! - Counter storage sits behind [`RateLimitStore`] so a shared cache can
//!   replace the in-process map for replicated deployments
//! - Increment-and-read is a single store operation (no read-then-write)
//! - Store failures resolve through an explicit [`FailurePolicy`]

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::audit::types::UNKNOWN;
use crate::observability::metrics;
use crate::security::headers::forwarded_client;

/// Window length and admission ceiling for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub window_ms: u64,
    pub max_requests: u32,
}

const FIFTEEN_MINUTES_MS: u64 = 15 * 60 * 1000;

impl RateLimitPolicy {
    pub const STRICT: Self = Self::new(FIFTEEN_MINUTES_MS, 10);
    pub const MODERATE: Self = Self::new(FIFTEEN_MINUTES_MS, 50);
    pub const LENIENT: Self = Self::new(FIFTEEN_MINUTES_MS, 100);
    pub const LOGIN: Self = Self::new(FIFTEEN_MINUTES_MS, 5);

    pub const fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// Look up one of the built-in presets by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "strict" => Some(Self::STRICT),
            "moderate" => Some(Self::MODERATE),
            "lenient" => Some(Self::LENIENT),
            "login" => Some(Self::LOGIN),
            _ => None,
        }
    }
}

/// Counter key: one window per client address per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub endpoint: String,
}

impl RateLimitKey {
    pub fn new(client: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.endpoint)
    }
}

/// Address the limiter counts against.
///
/// The socket peer, unless the peer is a trusted proxy, in which case the
/// forwarded client address is used. Clients can set forwarding headers
/// themselves, so they are ignored from untrusted peers.
pub fn client_address(
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> String {
    let Some(peer) = remote.map(|addr| addr.ip()) else {
        return UNKNOWN.to_string();
    };
    if trusted_proxies.contains(&peer) {
        if let Some(forwarded) = forwarded_client(headers) {
            return forwarded.to_string();
        }
    }
    peer.to_string()
}

/// Counter state after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub window_start_ms: i64,
    pub count: u32,
    pub limit: u32,
    pub window_ms: u64,
}

impl WindowState {
    fn fresh(now_ms: i64, policy: RateLimitPolicy) -> Self {
        Self {
            window_start_ms: now_ms,
            count: 0,
            limit: policy.max_requests,
            window_ms: policy.window_ms,
        }
    }

    pub fn reset_at_ms(&self) -> i64 {
        self.window_start_ms.saturating_add(self.window_ms as i64)
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.reset_at_ms()
    }
}

/// Counter store failure.
#[derive(Debug, thiserror::Error)]
#[error("rate limit store unavailable: {0}")]
pub struct RateLimitStoreError(pub String);

/// Backing storage for window counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically reset-if-expired, increment, and return the new state.
    async fn increment(
        &self,
        key: &RateLimitKey,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> Result<WindowState, RateLimitStoreError>;

    /// Drop windows that expired more than `grace_ms` ago. Returns how many.
    async fn purge_expired(&self, _now_ms: i64, _grace_ms: u64) -> Result<usize, RateLimitStoreError> {
        Ok(0)
    }
}

/// In-process counter store.
///
/// DashMap's entry API holds the shard lock for the whole
/// reset-increment-read sequence, so concurrent attempts on one key are
/// linearized.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<RateLimitKey, WindowState>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(
        &self,
        key: &RateLimitKey,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> Result<WindowState, RateLimitStoreError> {
        let mut window = self
            .windows
            .entry(key.clone())
            .or_insert_with(|| WindowState::fresh(now_ms, policy));

        if window.is_expired(now_ms) || window.window_ms != policy.window_ms {
            *window = WindowState::fresh(now_ms, policy);
        }
        window.limit = policy.max_requests;
        window.count = window.count.saturating_add(1);
        Ok(*window)
    }

    async fn purge_expired(&self, now_ms: i64, grace_ms: u64) -> Result<usize, RateLimitStoreError> {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now_ms < w.reset_at_ms().saturating_add(grace_ms as i64));
        Ok(before.saturating_sub(self.windows.len()))
    }
}

/// Behaviour when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request.
    Open,
    /// Reject the request as if the limit were exhausted.
    #[default]
    Closed,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub admitted: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    /// Reset time as whole Unix seconds, rounded up.
    pub fn reset_at_unix_secs(&self) -> i64 {
        (self.reset_at_ms + 999).div_euclid(1000)
    }

    fn from_window(state: WindowState, now_ms: i64) -> Self {
        let admitted = state.count <= state.limit;
        let reset_at_ms = state.reset_at_ms();
        let retry_after_secs = (!admitted).then(|| ceil_secs(reset_at_ms - now_ms));
        Self {
            admitted,
            limit: state.limit,
            remaining: state.limit.saturating_sub(state.count),
            reset_at_ms,
            retry_after_secs,
        }
    }
}

fn ceil_secs(ms: i64) -> u64 {
    let ms = ms.max(0) as u64;
    ms.div_ceil(1000)
}

/// Admission control front-end over a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    on_store_failure: FailurePolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, on_store_failure: FailurePolicy) -> Self {
        Self {
            store,
            on_store_failure,
        }
    }

    /// A limiter over a fresh in-process store that fails closed.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRateLimitStore::new()), FailurePolicy::Closed)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.on_store_failure
    }

    /// Count an attempt against `key` now.
    pub async fn check(&self, key: &RateLimitKey, policy: RateLimitPolicy) -> RateLimitDecision {
        self.check_at(key, policy, Utc::now().timestamp_millis()).await
    }

    /// Count an attempt against `key` at an explicit instant (ms since epoch).
    pub async fn check_at(
        &self,
        key: &RateLimitKey,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> RateLimitDecision {
        let decision = match self.store.increment(key, policy, now_ms).await {
            Ok(state) => RateLimitDecision::from_window(state, now_ms),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    policy = ?self.on_store_failure,
                    "Rate limit store failed"
                );
                self.degraded(policy, now_ms)
            }
        };

        if !decision.admitted {
            metrics::record_rate_limited(&key.endpoint);
        }
        decision
    }

    fn degraded(&self, policy: RateLimitPolicy, now_ms: i64) -> RateLimitDecision {
        let reset_at_ms = now_ms.saturating_add(policy.window_ms as i64);
        match self.on_store_failure {
            FailurePolicy::Open => RateLimitDecision {
                admitted: true,
                limit: policy.max_requests,
                remaining: policy.max_requests,
                reset_at_ms,
                retry_after_secs: None,
            },
            FailurePolicy::Closed => RateLimitDecision {
                admitted: false,
                limit: policy.max_requests,
                remaining: 0,
                reset_at_ms,
                retry_after_secs: Some(ceil_secs(policy.window_ms as i64)),
            },
        }
    }

    /// Evict windows that expired more than `grace` ago.
    pub async fn sweep(&self, now_ms: i64, grace: Duration) -> usize {
        match self
            .store
            .purge_expired(now_ms, grace.as_millis() as u64)
            .await
        {
            Ok(evicted) => evicted,
            Err(e) => {
                tracing::warn!(error = %e, "Rate limit sweep failed");
                0
            }
        }
    }

    /// Periodically evict expired windows until shutdown.
    pub async fn run_sweeper(
        self,
        interval: Duration,
        grace: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep(Utc::now().timestamp_millis(), grace).await;
                    if evicted > 0 {
                        tracing::debug!(evicted, "Evicted expired rate limit windows");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
