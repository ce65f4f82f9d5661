//! Outermost middleware: CORS preflight and response hardening.
//!
//! Runs before routing, so preflight never reaches rate limiting and
//! fallback responses (404, 405) are hardened too.

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::context::SharedCors;
use crate::security::headers::apply_hardening_headers;

pub async fn edge_middleware(State(cors): State<SharedCors>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let policy = cors.load_full();

    if req.method() == Method::OPTIONS {
        tracing::debug!(origin = origin.as_deref().unwrap_or("-"), path = %req.uri().path(), "CORS preflight");
        let mut response = StatusCode::OK.into_response();
        policy.apply_preflight(origin.as_deref(), response.headers_mut());
        apply_hardening_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    policy.apply_response(origin.as_deref(), response.headers_mut());
    apply_hardening_headers(response.headers_mut());
    response
}
