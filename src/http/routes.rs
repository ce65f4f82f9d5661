//! Built-in endpoints served by the shield binary.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::audit::{AuditAction, AuditFilter, AuditLogEntry};
use crate::config::ShieldConfig;
use crate::http::context::SecurityContext;
use crate::http::policy::EndpointPolicy;
use crate::http::response::HandlerError;
use crate::security::auth::{Principal, Role};
use crate::security::rate_limit::{FailurePolicy, RateLimitPolicy};

/// Upper bound on entries returned by one audit query.
pub const MAX_AUDIT_PAGE: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub ctx: SecurityContext,
    pub started_at: Instant,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub rate_limiting: bool,
    pub on_store_failure: FailurePolicy,
    pub allowed_origins: Vec<String>,
}

pub fn router(config: &ShieldConfig, ctx: &SecurityContext) -> Router<AppState> {
    let preset = |name: &str, fallback: RateLimitPolicy| {
        config.rate_limit.preset(name).unwrap_or(fallback)
    };
    let moderate = preset("moderate", RateLimitPolicy::MODERATE);
    let strict = preset("strict", RateLimitPolicy::STRICT);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/me",
            ctx.protect(EndpointPolicy::authenticated().rate_limit(moderate), get(me)),
        )
        .route(
            "/admin/status",
            ctx.protect(EndpointPolicy::roles([Role::Admin]).rate_limit(strict), get(status)),
        )
        .route(
            "/admin/audit",
            ctx.protect(
                EndpointPolicy::roles([Role::Admin])
                    .rate_limit(strict)
                    .audit(AuditAction::DataExported, "audit_log"),
                get(audit_log),
            ),
        )
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}

async fn status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        rate_limiting: state.ctx.rate_limit_enabled(),
        on_store_failure: state.ctx.rate_limiter().failure_policy(),
        allowed_origins: state.ctx.cors().allowed_origins().to_vec(),
    })
}

async fn audit_log(
    State(state): State<AppState>,
    Query(mut filter): Query<AuditFilter>,
) -> Result<Json<Vec<AuditLogEntry>>, HandlerError> {
    filter.limit = Some(filter.limit.unwrap_or(100).min(MAX_AUDIT_PAGE));
    let entries = state.ctx.audit().query(&filter).await?;
    Ok(Json(entries))
}
