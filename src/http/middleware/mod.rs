//! Request middleware.
//!
//! - `edge`: whole-router layer (CORS preflight, hardening headers)
//! - `guard`: per-route security pipeline

pub mod edge;
pub mod guard;
