//! Response hardening and CORS headers.
//!
//! # Responsibilities
//! - Stamp browser hardening headers on every response
//! - Answer CORS preflight against a fixed origin allow-list
//! - Echo allowed origins on ordinary responses
//!
//! # Design Decisions
//! - Origins are compared exactly; there are no wildcard entries
//! - A disallowed origin is answered with the literal `null`

use axum::http::header::{self, HeaderMap, HeaderValue};

pub const PREFLIGHT_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const PREFLIGHT_ALLOW_HEADERS: &str = "Content-Type, Authorization";
pub const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

/// Disable MIME sniffing, deny framing, enable the legacy XSS filter.
pub fn apply_hardening_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
}

/// Client address claimed by forwarding headers: the first
/// `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn forwarded_client(headers: &HeaderMap) -> Option<&str> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    })
}

/// Exact-match origin allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(allowed_origins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_origins: allowed_origins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// Value for `Access-Control-Allow-Origin` in a preflight answer.
    pub fn preflight_origin(&self, origin: Option<&str>) -> HeaderValue {
        origin
            .filter(|o| self.is_allowed(o))
            .and_then(|o| HeaderValue::from_str(o).ok())
            .unwrap_or_else(|| HeaderValue::from_static("null"))
    }

    /// Headers answering a preflight request.
    pub fn apply_preflight(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.preflight_origin(origin),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(PREFLIGHT_ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(PREFLIGHT_ALLOW_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
        );
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }

    /// Echo an allowed origin on a non-preflight response.
    pub fn apply_response(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        let Some(origin) = origin.filter(|o| self.is_allowed(o)) else {
            return;
        };
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CorsPolicy {
        CorsPolicy::new(["https://book.salon.test", "http://localhost:3000"])
    }

    #[test]
    fn test_hardening_headers() {
        let mut headers = HeaderMap::new();
        apply_hardening_headers(&mut headers);
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
    }

    #[test]
    fn test_preflight_listed_origin_echoed() {
        let mut headers = HeaderMap::new();
        policy().apply_preflight(Some("https://book.salon.test"), &mut headers);
        assert_eq!(headers["access-control-allow-origin"], "https://book.salon.test");
        assert_eq!(headers["access-control-allow-methods"], PREFLIGHT_ALLOW_METHODS);
        assert_eq!(headers["access-control-allow-headers"], PREFLIGHT_ALLOW_HEADERS);
        assert_eq!(headers["access-control-max-age"], "86400");
    }

    #[test]
    fn test_preflight_unlisted_origin_is_null() {
        let p = policy();
        assert_eq!(p.preflight_origin(Some("https://evil.test")), "null");
        assert_eq!(p.preflight_origin(Some("https://book.salon.test/")), "null");
        assert_eq!(p.preflight_origin(None), "null");
    }

    #[test]
    fn test_response_echo_only_for_allowed() {
        let mut headers = HeaderMap::new();
        policy().apply_response(Some("https://evil.test"), &mut headers);
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        policy().apply_response(Some("http://localhost:3000"), &mut headers);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    }
}
