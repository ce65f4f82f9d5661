//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID, tracing, timeout)
//!     → middleware/edge.rs (CORS preflight short-circuit, hardening headers)
//!     → Axum routing (routes.rs)
//!     → middleware/guard.rs (rate limit → auth → roles → validation → handler)
//!     → response.rs (fixed rejection bodies, opaque handler errors)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Security is declared per route with an [`EndpointPolicy`] and applied
//!   as a route layer, so unmatched requests never touch the pipeline
//! - Handlers see the principal and validated body only through extractors

pub mod context;
pub mod extract;
pub mod middleware;
pub mod policy;
pub mod response;
pub mod routes;
pub mod server;

pub use context::SecurityContext;
pub use extract::{Validated, ValidatedBody};
pub use policy::EndpointPolicy;
pub use response::{HandlerError, Rejection};
pub use server::HttpServer;
