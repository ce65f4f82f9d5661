//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, windows > 0, addresses parse)
//! - Check referential integrity (static token roles exist)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ShieldConfig;
use crate::security::auth::Role;

/// Minimum accepted length of an HS256 secret.
const MIN_JWT_SECRET_LEN: usize = 16;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address such as 0.0.0.0:8080",
        ));
    }

    for (field, value) in [
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.token_verify_ms", config.timeouts.token_verify_ms),
        ("timeouts.audit_write_ms", config.timeouts.audit_write_ms),
        ("rate_limit.sweep_interval_secs", config.rate_limit.sweep_interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let mut preset_names: Vec<_> = config.rate_limit.presets.keys().collect();
    preset_names.sort();
    for name in preset_names {
        let policy = &config.rate_limit.presets[name];
        if policy.window_ms == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.presets.{name}.window_ms"),
                "must be greater than zero",
            ));
        }
        if policy.max_requests == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.presets.{name}.max_requests"),
                "must be greater than zero",
            ));
        }
    }

    for (i, origin) in config.cors.allowed_origins.iter().enumerate() {
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            errors.push(ValidationError::new(
                format!("cors.allowed_origins[{i}]"),
                "must start with http:// or https://",
            ));
        } else if origin.ends_with('/') {
            errors.push(ValidationError::new(
                format!("cors.allowed_origins[{i}]"),
                "must not end with a slash",
            ));
        }
    }

    if let Some(secret) = &config.auth.jwt_secret {
        if secret.len() < MIN_JWT_SECRET_LEN {
            errors.push(ValidationError::new(
                "auth.jwt_secret",
                format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
            ));
        }
    }

    for (i, entry) in config.auth.static_tokens.iter().enumerate() {
        if entry.token.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("auth.static_tokens[{i}].token"),
                "must not be empty",
            ));
        }
        if entry.role.parse::<Role>().is_err() {
            errors.push(ValidationError::new(
                format!("auth.static_tokens[{i}].role"),
                format!("unknown role '{}'", entry.role),
            ));
        }
    }

    if config.audit.alert_queue_capacity == 0 {
        errors.push(ValidationError::new(
            "audit.alert_queue_capacity",
            "must be greater than zero",
        ));
    }

    if let Some(url) = &config.audit.alert_webhook_url {
        if reqwest::Url::parse(url).is_err() {
            errors.push(ValidationError::new(
                "audit.alert_webhook_url",
                "must be an absolute URL",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "limits.max_body_bytes",
            "must be greater than zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StaticTokenConfig;
    use crate::security::rate_limit::RateLimitPolicy;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ShieldConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = ShieldConfig::default();
        config.timeouts.token_verify_ms = 0;
        config.cors.allowed_origins = vec!["book.salon.test".into()];
        config.auth.jwt_secret = Some("short".into());
        config.auth.static_tokens.push(StaticTokenConfig {
            token: "t".into(),
            id: "u".into(),
            email: "a@b.test".into(),
            role: "OWNER".into(),
            locations: vec![],
        });
        config.rate_limit.presets.insert(
            "broken".into(),
            RateLimitPolicy {
                window_ms: 0,
                max_requests: 0,
            },
        );

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "timeouts.token_verify_ms",
                "rate_limit.presets.broken.window_ms",
                "rate_limit.presets.broken.max_requests",
                "cors.allowed_origins[0]",
                "auth.jwt_secret",
                "auth.static_tokens[0].role",
            ]
        );
    }

    #[test]
    fn test_trailing_slash_origin_rejected() {
        let mut config = ShieldConfig::default();
        config.cors.allowed_origins = vec!["https://book.salon.test/".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].message, "must not end with a slash");
    }
}
