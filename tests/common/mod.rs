//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use request_shield::audit::{
    alert_channel, AlertDispatcher, AlertError, AlertWorker, AuditAction, AuditFilter,
    AuditLogEntry, AuditLogger, AuditStore, MemoryAuditStore, StoreError,
};
use request_shield::config::StaticTokenConfig;
use request_shield::http::{EndpointPolicy, HandlerError, SecurityContext, Validated};
use request_shield::security::auth::{
    Authenticator, Principal, Role, StaticTokenVerifier, TokenClaims,
};
use request_shield::security::headers::CorsPolicy;
use request_shield::security::rate_limit::{RateLimitPolicy, RateLimiter};
use request_shield::security::limits::DEFAULT_MAX_BODY_BYTES;
use request_shield::security::schemas;
use tracing::subscriber::DefaultGuard;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const MANAGER_TOKEN: &str = "manager-token";
pub const STAFF_TOKEN: &str = "staff-token";
pub const ALLOWED_ORIGIN: &str = "https://book.salon.test";

/// Three requests per minute on `/api/public`.
pub const PUBLIC_LIMIT: RateLimitPolicy = RateLimitPolicy::new(60_000, 3);

pub fn static_tokens() -> Vec<StaticTokenConfig> {
    [
        (ADMIN_TOKEN, "u-admin", "owner@salon.test", "ADMIN"),
        (MANAGER_TOKEN, "u-manager", "manager@salon.test", "MANAGER"),
        (STAFF_TOKEN, "u-staff", "stylist@salon.test", "STAFF"),
    ]
    .into_iter()
    .map(|(token, id, email, role)| StaticTokenConfig {
        token: token.into(),
        id: id.into(),
        email: email.into(),
        role: role.into(),
        locations: vec!["loc-lisbon".into()],
    })
    .collect()
}

fn verifier() -> StaticTokenVerifier {
    StaticTokenVerifier::from_config(&static_tokens()).with_token(
        "owner-role-token",
        TokenClaims {
            sub: "u-owner".into(),
            email: "x@salon.test".into(),
            role: "OWNER".into(),
            locations: Vec::new(),
        },
    )
}

/// Alert dispatcher that remembers what it was sent.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<AuditAction>>,
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn send(&self, entry: &AuditLogEntry) -> Result<(), AlertError> {
        self.sent.lock().await.push(entry.action);
        Ok(())
    }
}

/// Audit store whose writes always fail.
pub struct FailingAuditStore;

#[async_trait]
impl AuditStore for FailingAuditStore {
    async fn append(&self, _entry: &AuditLogEntry) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("audit database unreachable".into()))
    }

    async fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        Err(StoreError::Unavailable("audit database unreachable".into()))
    }
}

/// Audit store whose writes never complete.
pub struct HangingAuditStore;

#[async_trait]
impl AuditStore for HangingAuditStore {
    async fn append(&self, _entry: &AuditLogEntry) -> Result<(), StoreError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub ctx: SecurityContext,
    /// Entries written through `ctx`, unless built over another store.
    pub store: Arc<MemoryAuditStore>,
    pub alerts: Arc<RecordingDispatcher>,
    pub alert_worker: Option<AlertWorker>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_max_body(max_body_bytes: usize) -> Self {
        let store = Arc::new(MemoryAuditStore::new());
        Self::build(store.clone(), store, max_body_bytes, Duration::from_secs(1))
    }

    /// Audit writes go to `audit_store`; `store` stays empty.
    pub fn with_audit_store(audit_store: Arc<dyn AuditStore>, write_timeout: Duration) -> Self {
        Self::build(
            audit_store,
            Arc::new(MemoryAuditStore::new()),
            DEFAULT_MAX_BODY_BYTES,
            write_timeout,
        )
    }

    fn build(
        audit_store: Arc<dyn AuditStore>,
        store: Arc<MemoryAuditStore>,
        max_body_bytes: usize,
        write_timeout: Duration,
    ) -> Self {
        let alerts = Arc::new(RecordingDispatcher::default());
        let (queue, worker) = alert_channel(64, alerts.clone());
        let audit = AuditLogger::new(audit_store, write_timeout).with_alerts(queue);
        let authenticator = Authenticator::new(Arc::new(verifier()), Duration::from_secs(1));
        let ctx = SecurityContext::new(
            RateLimiter::in_memory(),
            authenticator,
            audit,
            CorsPolicy::new([ALLOWED_ORIGIN]),
        )
        .with_max_body_bytes(max_body_bytes);

        Self {
            ctx,
            store,
            alerts,
            alert_worker: Some(worker),
        }
    }

    /// Test application: a handful of routes covering every policy shape.
    pub fn app(&self) -> Router {
        let ctx = &self.ctx;
        let router = Router::new()
            .route(
                "/api/public",
                ctx.protect(EndpointPolicy::public().rate_limit(PUBLIC_LIMIT), get(|| async { "ok" })),
            )
            .route(
                "/api/login",
                ctx.protect(
                    EndpointPolicy::public()
                        .rate_limit(RateLimitPolicy::LOGIN)
                        .schema(schemas::login())
                        .audit(AuditAction::LoginSuccess, "session"),
                    post(login),
                ),
            )
            .route(
                "/api/services",
                ctx.protect(
                    EndpointPolicy::roles([Role::Admin, Role::Manager])
                        .schema(schemas::service_creation())
                        .audit(AuditAction::ResourceCreated, "service"),
                    post(create_service),
                ),
            )
            .route(
                "/api/refunds",
                ctx.protect(
                    EndpointPolicy::roles([Role::Admin, Role::Manager])
                        .audit(AuditAction::RefundIssued, "transaction"),
                    post(refund),
                ),
            )
            .route(
                "/api/crash",
                ctx.protect(
                    EndpointPolicy::authenticated().audit(AuditAction::SystemBackup, "backup"),
                    get(crash),
                ),
            )
            .route(
                "/api/me",
                ctx.protect(EndpointPolicy::authenticated(), get(me)),
            )
            .route(
                "/api/misconfigured",
                ctx.protect(EndpointPolicy::public(), get(me)),
            );
        ctx.harden(router)
    }

    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.store.entries().await
    }

    pub async fn entries_for(&self, action: AuditAction) -> Vec<AuditLogEntry> {
        self.entries()
            .await
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
}

async fn login(Validated(req): Validated<LoginRequest>) -> Json<Value> {
    Json(json!({ "email": req.email }))
}

async fn create_service(principal: Principal, Validated(service): Validated<Value>) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "createdBy": principal.id, "service": service })),
    )
        .into_response()
}

async fn refund() -> Result<Json<Value>, HandlerError> {
    Err(HandlerError::new("ledger connection refused at 10.0.0.5:5432"))
}

async fn crash() -> &'static str {
    panic!("backup volume missing")
}

async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}

pub fn get_req(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

pub fn json_req(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn assert_hardened(response: &Response) {
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
}

/// Connection info as axum records it for a peer at `ip`.
pub fn peer(ip: &str) -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::new(ip.parse().unwrap(), 40_000))
}

/// Shared buffer receiving formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<StdMutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture log output on the current thread until the guard drops.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
