//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (fixed-window admission per client IP and endpoint)
//!     → auth.rs (bearer header or session cookie → Principal)
//!     → access_control.rs (role membership)
//!     → validation.rs + schemas.rs (sanitize.rs first, then typed checks)
//!     → handler
//! Every response:
//!     → headers.rs (hardening headers, CORS)
//! ```
//!
//! # Design Decisions
//! - Each check is a pure function or a small struct; ordering lives in
//!   the HTTP guard, not here
//! - Fail closed: a verifier timeout or store error rejects the request
//! - No trust in client input

pub mod access_control;
pub mod auth;
pub mod headers;
pub mod limits;
pub mod rate_limit;
pub mod sanitize;
pub mod schemas;
pub mod validation;
