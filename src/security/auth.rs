//! Token authentication.
//!
//! # Responsibilities
//! - Extract the raw credential from the request (bearer header or session cookie)
//! - Verify it through a [`TokenVerifier`] within a bounded time
//! - Map verified claims to an immutable [`Principal`]
//!
//! # Design Decisions
//! - Verifier timeouts fail closed
//! - Unknown role strings are authentication failures, not GUEST

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::StaticTokenConfig;

/// Cookie carrying a session token when no bearer header is sent.
pub const SESSION_COOKIE: &str = "session_token";

/// Coarse role used for endpoint authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Staff => "STAFF",
            Role::Guest => "GUEST",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "STAFF" => Ok(Role::Staff),
            "GUEST" => Ok(Role::Guest),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Authenticated identity for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub authorized_locations: BTreeSet<String>,
}

/// Claims returned by a token verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// Verifies a raw token. `None` means the token is not acceptable.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, raw_token: &str) -> Option<TokenClaims>;
}

/// HS256 JWT verifier. Requires a valid signature and an unexpired `exp`.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: String,
    email: String,
    role: String,
    #[serde(default)]
    locations: Vec<String>,
}

impl JwtVerifier {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, raw_token: &str) -> Option<TokenClaims> {
        match jsonwebtoken::decode::<JwtClaims>(raw_token, &self.key, &self.validation) {
            Ok(data) => Some(TokenClaims {
                sub: data.claims.sub,
                email: data.claims.email,
                role: data.claims.role,
                locations: data.claims.locations,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "JWT rejected");
                None
            }
        }
    }
}

/// Fixed token table, for development setups and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, TokenClaims>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, claims: TokenClaims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }

    pub fn from_config(entries: &[StaticTokenConfig]) -> Self {
        let tokens = entries
            .iter()
            .map(|e| {
                (
                    e.token.clone(),
                    TokenClaims {
                        sub: e.id.clone(),
                        email: e.email.clone(),
                        role: e.role.clone(),
                        locations: e.locations.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, raw_token: &str) -> Option<TokenClaims> {
        self.tokens.get(raw_token).cloned()
    }
}

/// Why a request could not be authenticated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("no credentials presented")]
    MissingToken,
    #[error("token rejected by verifier")]
    InvalidToken,
    #[error("token verification timed out")]
    VerifierTimeout,
    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
}

impl AuthFailure {
    /// Short machine-readable reason for audit details.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::InvalidToken => "invalid_token",
            AuthFailure::VerifierTimeout => "verifier_timeout",
            AuthFailure::UnknownRole(_) => "unknown_role",
        }
    }
}

/// Resolves raw credentials to principals.
#[derive(Clone)]
pub struct Authenticator {
    verifier: Arc<dyn TokenVerifier>,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn TokenVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    pub async fn resolve(&self, raw_token: Option<&str>) -> Result<Principal, AuthFailure> {
        let token = raw_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthFailure::MissingToken)?;

        let claims = tokio::time::timeout(self.timeout, self.verifier.verify(token))
            .await
            .map_err(|_| {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Token verifier timed out");
                AuthFailure::VerifierTimeout
            })?
            .ok_or(AuthFailure::InvalidToken)?;

        let role = claims.role.parse::<Role>()?;
        Ok(Principal {
            id: claims.sub,
            email: claims.email,
            role,
            authorized_locations: claims.locations.into_iter().collect(),
        })
    }
}

/// Pull the raw credential from `Authorization: Bearer` or the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
        })
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|t| !t.is_empty())
}
