//! Per-route security pipeline.
//!
//! # Data Flow
//! ```text
//! START
//!     → RATE_LIMIT_CHECK ──▶ 429 (audit RATE_LIMIT_EXCEEDED)
//!     → AUTH_CHECK       ──▶ 401 (audit UNAUTHORIZED_ACCESS_ATTEMPT)
//!     → ROLE_CHECK       ──▶ 403 (audit UNAUTHORIZED_ACCESS_ATTEMPT)
//!     → VALIDATE_BODY    ──▶ 413 / 400 (audit VALIDATION_FAILED if enabled)
//!     → HANDLER_INVOKE   ──▶ 500 on error or panic (audit SUSPICIOUS_ACTIVITY
//!                            when the endpoint declares an audit action)
//!     → RESPONSE (declared audit action recorded on 2xx)
//! ```
//!
//! # Design Decisions
//! - Stages run strictly in order; each rejection short-circuits the rest
//! - Rejection audits are awaited before the response is returned; the
//!   logger bounds the wait and never fails
//! - The principal and validated body reach the handler only through
//!   request extensions set here
//! - Rate limiting keys on the socket peer: it runs before authentication,
//!   so no unverified token is trusted for identity. Forwarding headers
//!   name the client only when the peer is a configured trusted proxy

use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use serde_json::Value;

use crate::audit::{AuditAction, AuditEvent, ClientContext};
use crate::http::context::SecurityContext;
use crate::http::extract::ValidatedBody;
use crate::http::policy::EndpointPolicy;
use crate::http::response::{apply_rate_limit_headers, HandlerError, HandlerFailure, Rejection};
use crate::observability::metrics;
use crate::security::access_control::authorize;
use crate::security::auth::{extract_token, Principal};
use crate::security::limits::{read_body_limited, BodyError};
use crate::security::rate_limit::{client_address, RateLimitKey};
use crate::security::validation::validate;

/// State bound to one guarded route.
#[derive(Clone)]
pub struct GuardState {
    pub(crate) ctx: SecurityContext,
    pub(crate) policy: Arc<EndpointPolicy>,
}

/// Request facts captured before the request is consumed.
struct RequestInfo {
    method: Method,
    endpoint: String,
    request_id: Option<String>,
    client: ClientContext,
    rate_limit_client: String,
    started: Instant,
}

impl RequestInfo {
    fn capture(req: &Request, trusted_proxies: &[IpAddr]) -> Self {
        let endpoint = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());
        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self {
            method: req.method().clone(),
            endpoint,
            request_id: req
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            client: ClientContext::resolve(req.headers(), remote),
            rate_limit_client: client_address(req.headers(), remote, trusted_proxies),
            started: Instant::now(),
        }
    }

    fn event(&self, action: AuditAction, policy: &EndpointPolicy) -> AuditEvent {
        let mut event = AuditEvent::new(action)
            .detail("method", self.method.as_str())
            .detail("endpoint", self.endpoint.clone());
        if let Some(id) = &self.request_id {
            event = event.detail("requestId", id.clone());
        }
        if let Some(resource_type) = &policy.resource_type {
            event = event.resource(resource_type.clone(), None);
        }
        event
    }
}

pub async fn security_middleware(State(guard): State<GuardState>, req: Request, next: Next) -> Response {
    let GuardState { ctx, policy } = guard;
    let info = RequestInfo::capture(&req, &ctx.trusted_proxies);

    match run_pipeline(&ctx, &policy, &info, req, next).await {
        Ok(response) => {
            metrics::record_request(
                info.method.as_str(),
                response.status().as_u16(),
                "handler",
                info.started,
            );
            response
        }
        Err(rejection) => {
            tracing::info!(
                request_id = info.request_id.as_deref().unwrap_or("-"),
                endpoint = %info.endpoint,
                ip_address = %info.client.ip_address,
                status = rejection.status().as_u16(),
                stage = rejection.stage(),
                "Request rejected"
            );
            metrics::record_rejection(rejection.stage());
            metrics::record_request(
                info.method.as_str(),
                rejection.status().as_u16(),
                rejection.stage(),
                info.started,
            );
            rejection.into_response()
        }
    }
}

async fn run_pipeline(
    ctx: &SecurityContext,
    policy: &EndpointPolicy,
    info: &RequestInfo,
    req: Request,
    next: Next,
) -> Result<Response, Rejection> {
    // RATE_LIMIT_CHECK
    let admission = match policy.rate_limit.filter(|_| ctx.rate_limit_enabled) {
        Some(limit) => {
            let key = RateLimitKey::new(info.rate_limit_client.clone(), info.endpoint.clone());
            let decision = ctx.rate_limiter.check(&key, limit).await;
            if !decision.admitted {
                let event = info
                    .event(AuditAction::RateLimitExceeded, policy)
                    .detail("limit", decision.limit)
                    .detail("retryAfter", decision.retry_after_secs);
                ctx.audit.record(event, Some(&info.client)).await;
                return Err(Rejection::RateLimited(decision));
            }
            Some(decision)
        }
        None => None,
    };

    // AUTH_CHECK
    let principal = if policy.require_auth {
        match ctx.authenticator.resolve(extract_token(req.headers())).await {
            Ok(principal) => Some(principal),
            Err(failure) => {
                let event = info
                    .event(AuditAction::UnauthorizedAccessAttempt, policy)
                    .detail("reason", failure.reason());
                ctx.audit.record(event, Some(&info.client)).await;
                return Err(Rejection::Unauthenticated);
            }
        }
    } else {
        None
    };

    // ROLE_CHECK
    if let Some(principal) = &principal {
        if !authorize(principal, &policy.required_roles) {
            let required: Vec<&str> = policy.required_roles.iter().map(|r| r.as_str()).collect();
            let event = info
                .event(AuditAction::UnauthorizedAccessAttempt, policy)
                .principal(principal)
                .detail("reason", "insufficient_role")
                .detail("requiredRoles", required);
            ctx.audit.record(event, Some(&info.client)).await;
            return Err(Rejection::Forbidden);
        }
    }

    // VALIDATE_BODY
    let (mut parts, body) = req.into_parts();
    let body = match &policy.schema {
        Some(schema) if carries_body(&parts.method) => {
            let bytes = match read_body_limited(body, ctx.max_body_bytes).await {
                Ok(bytes) => bytes,
                Err(BodyError::TooLarge { .. }) => return Err(Rejection::PayloadTooLarge),
                Err(e @ BodyError::Read(_)) => {
                    tracing::warn!(error = %e, "Request body could not be read");
                    return Err(Rejection::InvalidJson);
                }
            };
            let raw: Value = match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(error = %e, "Request body is not JSON");
                    let details = vec![format!("body: {e}")];
                    audit_validation_failure(ctx, policy, info, principal.as_ref(), &details).await;
                    return Err(Rejection::InvalidJson);
                }
            };
            let clean = match validate(schema, raw) {
                Ok(clean) => clean,
                Err(details) => {
                    audit_validation_failure(ctx, policy, info, principal.as_ref(), &details).await;
                    return Err(Rejection::InvalidInput(details));
                }
            };
            let bytes = serde_json::to_vec(&clean).map_err(|_| Rejection::Internal)?;
            parts.headers.remove(header::CONTENT_LENGTH);
            parts.extensions.insert(ValidatedBody(clean));
            Body::from(bytes)
        }
        _ => body,
    };

    if let Some(principal) = &principal {
        parts.extensions.insert(principal.clone());
    }

    // HANDLER_INVOKE
    let req = Request::from_parts(parts, body);
    let mut response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => HandlerError::new(panic_message(panic.as_ref())).into_response(),
    };

    if let Some(HandlerFailure(message)) = response.extensions().get::<HandlerFailure>() {
        tracing::error!(
            request_id = info.request_id.as_deref().unwrap_or("-"),
            endpoint = %info.endpoint,
            error = %message,
            "Handler failed"
        );
        if let Some(action) = policy.audit_action {
            let mut event = info
                .event(AuditAction::SuspiciousActivity, policy)
                .detail("declaredAction", action.as_str())
                .detail("error", message.clone());
            if let Some(principal) = &principal {
                event = event.principal(principal);
            }
            ctx.audit.record(event, Some(&info.client)).await;
        }
    } else if response.status().is_success() {
        if let Some(action) = policy.audit_action {
            let mut event = info.event(action, policy);
            if let Some(principal) = &principal {
                event = event.principal(principal);
            }
            ctx.audit.record(event, Some(&info.client)).await;
        }
    }

    if let Some(decision) = &admission {
        apply_rate_limit_headers(response.headers_mut(), decision);
    }
    Ok(response)
}

fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

async fn audit_validation_failure(
    ctx: &SecurityContext,
    policy: &EndpointPolicy,
    info: &RequestInfo,
    principal: Option<&Principal>,
    details: &[String],
) {
    if !ctx.audit_validation_failures {
        return;
    }
    let mut event = info
        .event(AuditAction::ValidationFailed, policy)
        .detail("errors", details.to_vec());
    if let Some(principal) = principal {
        event = event.principal(principal);
    }
    ctx.audit.record(event, Some(&info.client)).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
