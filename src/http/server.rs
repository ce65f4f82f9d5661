//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the security collaborators from configuration
//! - Create the Axum Router with the built-in endpoints
//! - Wire up middleware (tracing, timeout, request ID, edge hardening)
//! - Run background tasks (rate-limit sweeper, alert worker, CORS reload)
//! - Serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::audit::{
    alert_channel, AlertDispatcher, AlertError, AlertWorker, AuditLogger, AuditStore,
    JsonlAuditStore, LogAlertDispatcher, MemoryAuditStore, StoreError, WebhookAlertDispatcher,
};
use crate::config::ShieldConfig;
use crate::http::context::SecurityContext;
use crate::http::routes::{self, AppState};
use crate::security::auth::{Authenticator, JwtVerifier, StaticTokenVerifier, TokenVerifier};
use crate::security::headers::CorsPolicy;
use crate::security::rate_limit::{MemoryRateLimitStore, RateLimiter};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open audit store: {0}")]
    AuditStore(#[from] StoreError),

    #[error("failed to build alert dispatcher: {0}")]
    Alerts(#[from] AlertError),
}

/// HTTP server for the request shield.
pub struct HttpServer {
    router: Router,
    config: ShieldConfig,
    context: SecurityContext,
    alert_worker: Option<AlertWorker>,
}

impl HttpServer {
    /// Build every collaborator the configuration names.
    pub async fn from_config(config: ShieldConfig) -> Result<Self, StartupError> {
        let verifier: Arc<dyn TokenVerifier> = match &config.auth.jwt_secret {
            Some(secret) => {
                tracing::info!("Using HS256 JWT verification");
                Arc::new(JwtVerifier::hs256(secret.as_bytes()))
            }
            None => {
                tracing::info!(tokens = config.auth.static_tokens.len(), "Using static token table");
                Arc::new(StaticTokenVerifier::from_config(&config.auth.static_tokens))
            }
        };

        let store: Arc<dyn AuditStore> = match &config.audit.log_path {
            Some(path) => Arc::new(JsonlAuditStore::open(path).await?),
            None => {
                tracing::warn!("No audit log path configured, audit trail is in memory only");
                Arc::new(MemoryAuditStore::new())
            }
        };

        let dispatcher: Arc<dyn AlertDispatcher> = match &config.audit.alert_webhook_url {
            Some(url) => Arc::new(WebhookAlertDispatcher::new(url.clone())?),
            None => Arc::new(LogAlertDispatcher),
        };
        let (alerts, worker) = alert_channel(config.audit.alert_queue_capacity, dispatcher);

        let audit = AuditLogger::new(store, Duration::from_millis(config.timeouts.audit_write_ms))
            .with_alerts(alerts);
        let authenticator = Authenticator::new(
            verifier,
            Duration::from_millis(config.timeouts.token_verify_ms),
        );
        let rate_limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            config.rate_limit.on_store_failure,
        );

        let context = SecurityContext::new(
            rate_limiter,
            authenticator,
            audit,
            CorsPolicy::new(config.cors.allowed_origins.clone()),
        )
        .with_rate_limiting(config.rate_limit.enabled)
        .with_max_body_bytes(config.limits.max_body_bytes)
        .with_validation_audit(config.audit.log_validation_failures)
        .with_trusted_proxies(config.listener.trusted_proxies.iter().copied());

        Ok(Self::new(config, context, Some(worker)))
    }

    /// Assemble a server around an existing context.
    pub fn new(config: ShieldConfig, context: SecurityContext, alert_worker: Option<AlertWorker>) -> Self {
        let router = Self::build_router(&config, &context);
        Self {
            router,
            config,
            context,
            alert_worker,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ShieldConfig, context: &SecurityContext) -> Router {
        let state = AppState {
            ctx: context.clone(),
            started_at: Instant::now(),
        };
        let app = routes::router(config, context)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        context
            .harden(app)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn context(&self) -> &SecurityContext {
        &self.context
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Reloaded configurations arriving on `config_updates` replace the CORS
    /// allow-list; other sections take effect on restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ShieldConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let rate_limit = &self.config.rate_limit;
        if rate_limit.enabled {
            let limiter = self.context.rate_limiter().clone();
            tokio::spawn(limiter.run_sweeper(
                Duration::from_secs(rate_limit.sweep_interval_secs),
                Duration::from_secs(rate_limit.eviction_grace_secs),
                shutdown.resubscribe(),
            ));
        }

        if let Some(worker) = self.alert_worker {
            tokio::spawn(worker.run(shutdown.resubscribe()));
        }

        let context = self.context.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => {
                            tracing::info!(
                                origins = config.cors.allowed_origins.len(),
                                "Applying reloaded CORS allow-list"
                            );
                            context.set_cors(CorsPolicy::new(config.cors.allowed_origins));
                        }
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
