//! Request security and audit pipeline.
//!
//! Rate limiting, authentication, role checks, input validation and audit
//! logging in front of axum handlers, with response hardening on the way out.

pub mod audit;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ShieldConfig;
pub use http::{EndpointPolicy, HttpServer, SecurityContext};
pub use lifecycle::Shutdown;
