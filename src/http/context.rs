//! Shared state of the security pipeline.

use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::routing::MethodRouter;
use axum::Router;

use crate::audit::AuditLogger;
use crate::http::middleware::{edge, guard};
use crate::http::policy::EndpointPolicy;
use crate::security::auth::Authenticator;
use crate::security::headers::CorsPolicy;
use crate::security::limits::DEFAULT_MAX_BODY_BYTES;
use crate::security::rate_limit::RateLimiter;

/// CORS allow-list, swappable at runtime.
pub type SharedCors = Arc<ArcSwap<CorsPolicy>>;

/// Collaborators and settings every guarded route shares. Cheap to clone.
#[derive(Clone)]
pub struct SecurityContext {
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) rate_limit_enabled: bool,
    pub(crate) authenticator: Authenticator,
    pub(crate) audit: AuditLogger,
    pub(crate) cors: SharedCors,
    pub(crate) max_body_bytes: usize,
    pub(crate) audit_validation_failures: bool,
    pub(crate) trusted_proxies: Arc<[IpAddr]>,
}

impl SecurityContext {
    pub fn new(
        rate_limiter: RateLimiter,
        authenticator: Authenticator,
        audit: AuditLogger,
        cors: CorsPolicy,
    ) -> Self {
        Self {
            rate_limiter,
            rate_limit_enabled: true,
            authenticator,
            audit,
            cors: Arc::new(ArcSwap::from_pointee(cors)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            audit_validation_failures: true,
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    pub fn with_rate_limiting(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = enabled;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Whether 400 rejections are recorded as VALIDATION_FAILED.
    pub fn with_validation_audit(mut self, enabled: bool) -> Self {
        self.audit_validation_failures = enabled;
        self
    }

    /// Peers allowed to name the client through forwarding headers.
    pub fn with_trusted_proxies(mut self, proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        self.trusted_proxies = proxies.into_iter().collect();
        self
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn rate_limit_enabled(&self) -> bool {
        self.rate_limit_enabled
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn cors(&self) -> Arc<CorsPolicy> {
        self.cors.load_full()
    }

    /// Replace the CORS allow-list for subsequent requests.
    pub fn set_cors(&self, policy: CorsPolicy) {
        self.cors.store(Arc::new(policy));
    }

    /// Put `route` behind the security pipeline described by `policy`.
    pub fn protect<S>(&self, policy: EndpointPolicy, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let state = guard::GuardState {
            ctx: self.clone(),
            policy: Arc::new(policy),
        };
        route.route_layer(axum::middleware::from_fn_with_state(
            state,
            guard::security_middleware,
        ))
    }

    /// Add the edge layer (CORS preflight, hardening headers) to a router.
    pub fn harden(&self, router: Router) -> Router {
        router.layer(axum::middleware::from_fn_with_state(
            self.cors.clone(),
            edge::edge_middleware,
        ))
    }
}
