//! Extractors for data the guard attached to an admitted request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::response::Rejection;
use crate::security::auth::Principal;
use crate::security::validation::ROOT_PATH;

/// Sanitized, schema-checked request body as stored by the guard.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBody(pub Value);

/// The validated request body, deserialized into `T`.
///
/// Only available on routes whose policy declares a schema.
#[derive(Debug, Clone)]
pub struct Validated<T>(pub T);

impl<S, T> FromRequestParts<S> for Validated<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(ValidatedBody(value)) = parts.extensions.get::<ValidatedBody>() else {
            tracing::error!(path = %parts.uri.path(), "Validated<T> used on a route without a schema");
            return Err(Rejection::Internal);
        };
        serde_json::from_value(value.clone())
            .map(Validated)
            .map_err(|e| Rejection::InvalidInput(vec![format!("{ROOT_PATH}: {e}")]))
    }
}

/// The authenticated principal.
///
/// Only available on routes whose policy requires authentication; the guard
/// has already answered 401 for unauthenticated callers, so a missing
/// principal here is a routing mistake.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(principal) = parts.extensions.get::<Principal>() else {
            tracing::error!(path = %parts.uri.path(), "Principal used on a route without authentication");
            return Err(Rejection::Internal);
        };
        Ok(principal.clone())
    }
}
