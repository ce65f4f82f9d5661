//! Audit data model.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::security::auth::{Principal, Role};
use crate::security::headers::forwarded_client;

/// Placeholder recorded when an address or user agent cannot be determined.
pub const UNKNOWN: &str = "unknown";

/// Security-relevant event kinds. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    Logout,
    PasswordChanged,
    PasswordResetRequested,
    UserCreated,
    UserUpdated,
    UserDeactivated,
    UserDeleted,
    RoleChanged,
    ResourceCreated,
    ResourceUpdated,
    ResourceDeleted,
    RefundIssued,
    DataExported,
    ConfigurationChanged,
    SystemBackup,
    SystemRestore,
    AppointmentCancelled,
    OrderCancelled,
    StockAdjusted,
    UnauthorizedAccessAttempt,
    RateLimitExceeded,
    SuspiciousActivity,
    ValidationFailed,
}

impl AuditAction {
    pub const ALL: [AuditAction; 25] = [
        AuditAction::LoginSuccess,
        AuditAction::LoginFailure,
        AuditAction::Logout,
        AuditAction::PasswordChanged,
        AuditAction::PasswordResetRequested,
        AuditAction::UserCreated,
        AuditAction::UserUpdated,
        AuditAction::UserDeactivated,
        AuditAction::UserDeleted,
        AuditAction::RoleChanged,
        AuditAction::ResourceCreated,
        AuditAction::ResourceUpdated,
        AuditAction::ResourceDeleted,
        AuditAction::RefundIssued,
        AuditAction::DataExported,
        AuditAction::ConfigurationChanged,
        AuditAction::SystemBackup,
        AuditAction::SystemRestore,
        AuditAction::AppointmentCancelled,
        AuditAction::OrderCancelled,
        AuditAction::StockAdjusted,
        AuditAction::UnauthorizedAccessAttempt,
        AuditAction::RateLimitExceeded,
        AuditAction::SuspiciousActivity,
        AuditAction::ValidationFailed,
    ];

    /// Severity used when the caller does not override it.
    pub fn default_severity(self) -> AuditSeverity {
        use AuditAction::*;
        match self {
            UserDeleted | SystemRestore | UnauthorizedAccessAttempt | SuspiciousActivity => {
                AuditSeverity::Critical
            }
            PasswordChanged | UserCreated | UserDeactivated | RefundIssued | DataExported
            | ConfigurationChanged | RoleChanged => AuditSeverity::High,
            LoginFailure | RateLimitExceeded | AppointmentCancelled | OrderCancelled
            | StockAdjusted | PasswordResetRequested => AuditSeverity::Medium,
            LoginSuccess | Logout | UserUpdated | ResourceCreated | ResourceUpdated
            | ResourceDeleted | SystemBackup | ValidationFailed => AuditSeverity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use AuditAction::*;
        match self {
            LoginSuccess => "LOGIN_SUCCESS",
            LoginFailure => "LOGIN_FAILURE",
            Logout => "LOGOUT",
            PasswordChanged => "PASSWORD_CHANGED",
            PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            UserCreated => "USER_CREATED",
            UserUpdated => "USER_UPDATED",
            UserDeactivated => "USER_DEACTIVATED",
            UserDeleted => "USER_DELETED",
            RoleChanged => "ROLE_CHANGED",
            ResourceCreated => "RESOURCE_CREATED",
            ResourceUpdated => "RESOURCE_UPDATED",
            ResourceDeleted => "RESOURCE_DELETED",
            RefundIssued => "REFUND_ISSUED",
            DataExported => "DATA_EXPORTED",
            ConfigurationChanged => "CONFIGURATION_CHANGED",
            SystemBackup => "SYSTEM_BACKUP",
            SystemRestore => "SYSTEM_RESTORE",
            AppointmentCancelled => "APPOINTMENT_CANCELLED",
            OrderCancelled => "ORDER_CANCELLED",
            StockAdjusted => "STOCK_ADJUSTED",
            UnauthorizedAccessAttempt => "UNAUTHORIZED_ACCESS_ATTEMPT",
            RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            ValidationFailed => "VALIDATION_FAILED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown audit {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl FromStr for AuditAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Ascending criticality tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Low => "LOW",
            AuditSeverity::Medium => "MEDIUM",
            AuditSeverity::High => "HIGH",
            AuditSeverity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditSeverity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AuditSeverity::Low,
            AuditSeverity::Medium,
            AuditSeverity::High,
            AuditSeverity::Critical,
        ]
        .into_iter()
        .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnknownVariant {
            kind: "severity",
            value: s.to_string(),
        })
    }
}

/// One persisted audit record. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Caller-side address and user agent, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientContext {
    /// `X-Forwarded-For` (first hop), then `X-Real-IP`, then the socket peer.
    pub fn resolve(headers: &HeaderMap, remote: Option<SocketAddr>) -> Self {
        let ip_address = forwarded_client(headers)
            .map(str::to_string)
            .or_else(|| remote.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        Self {
            ip_address,
            user_agent,
        }
    }
}

/// An event handed to the audit logger.
///
/// Severity, address and user agent are optional; anything left unset is
/// derived when the event becomes an [`AuditLogEntry`].
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub severity: Option<AuditSeverity>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_role: Option<Role>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Map<String, Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            severity: None,
            user_id: None,
            user_email: None,
            user_role: None,
            resource_type: None,
            resource_id: None,
            details: Map::new(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn principal(mut self, principal: &Principal) -> Self {
        self.user_id = Some(principal.id.clone());
        self.user_email = Some(principal.email.clone());
        self.user_role = Some(principal.role);
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: Option<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = resource_id;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn client(mut self, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Resolve severity and client fields, stamp id and time.
    pub fn into_entry(self, client: Option<&ClientContext>) -> AuditLogEntry {
        let severity = self
            .severity
            .unwrap_or_else(|| self.action.default_severity());
        let ip_address = self
            .ip_address
            .or_else(|| client.map(|c| c.ip_address.clone()))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let user_agent = self
            .user_agent
            .or_else(|| client.map(|c| c.user_agent.clone()))
            .unwrap_or_else(|| UNKNOWN.to_string());

        AuditLogEntry {
            id: Uuid::new_v4(),
            action: self.action,
            severity,
            user_id: self.user_id,
            user_email: self.user_email,
            user_role: self.user_role,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            details: self.details,
            ip_address,
            user_agent,
            created_at: Utc::now(),
        }
    }
}

/// Audit trail query. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub min_severity: Option<AuditSeverity>,
    pub user_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.action.map_or(true, |a| entry.action == a)
            && self.min_severity.map_or(true, |s| entry.severity >= s)
            && self
                .user_id
                .as_deref()
                .map_or(true, |id| entry.user_id.as_deref() == Some(id))
            && self.since.map_or(true, |t| entry.created_at >= t)
            && self.until.map_or(true, |t| entry.created_at < t)
    }

    /// Keep matching entries, newest first, truncated to `limit`.
    pub fn apply(&self, entries: impl IntoIterator<Item = AuditLogEntry>) -> Vec<AuditLogEntry> {
        let mut out: Vec<_> = entries.into_iter().filter(|e| self.matches(e)).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration;
    use std::collections::BTreeSet;

    #[test]
    fn test_severity_table() {
        assert_eq!(AuditAction::UserDeleted.default_severity(), AuditSeverity::Critical);
        assert_eq!(
            AuditAction::UnauthorizedAccessAttempt.default_severity(),
            AuditSeverity::Critical
        );
        assert_eq!(AuditAction::RefundIssued.default_severity(), AuditSeverity::High);
        assert_eq!(AuditAction::RateLimitExceeded.default_severity(), AuditSeverity::Medium);
        assert_eq!(AuditAction::StockAdjusted.default_severity(), AuditSeverity::Medium);
        assert_eq!(AuditAction::LoginSuccess.default_severity(), AuditSeverity::Low);
        assert_eq!(AuditAction::ValidationFailed.default_severity(), AuditSeverity::Low);
    }

    #[test]
    fn test_action_names_match_serde() {
        for action in AuditAction::ALL {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, action.as_str());
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("login_success".parse::<AuditAction>().is_ok());
        assert!("NOT_AN_ACTION".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AuditSeverity::Low < AuditSeverity::Medium);
        assert!(AuditSeverity::High < AuditSeverity::Critical);
        assert_eq!("critical".parse::<AuditSeverity>().unwrap(), AuditSeverity::Critical);
    }

    #[test]
    fn test_client_resolution_order() {
        let remote: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(ClientContext::resolve(&headers, None).ip_address, UNKNOWN);
        assert_eq!(ClientContext::resolve(&headers, Some(remote)).ip_address, "10.0.0.9");

        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.7"));
        assert_eq!(ClientContext::resolve(&headers, Some(remote)).ip_address, "192.0.2.7");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.4 , 10.1.1.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));
        let ctx = ClientContext::resolve(&headers, Some(remote));
        assert_eq!(ctx.ip_address, "203.0.113.4");
        assert_eq!(ctx.user_agent, "curl/8");
    }

    #[test]
    fn test_event_into_entry() {
        let principal = Principal {
            id: "u-1".into(),
            email: "ana@salon.test".into(),
            role: Role::Staff,
            authorized_locations: BTreeSet::new(),
        };
        let client = ClientContext {
            ip_address: "198.51.100.1".into(),
            user_agent: "test".into(),
        };

        let entry = AuditEvent::new(AuditAction::RefundIssued)
            .principal(&principal)
            .resource("transaction", Some("t-9".into()))
            .detail("amount", 12.5)
            .into_entry(Some(&client));
        assert_eq!(entry.severity, AuditSeverity::High);
        assert_eq!(entry.user_role, Some(Role::Staff));
        assert_eq!(entry.ip_address, "198.51.100.1");
        assert_eq!(entry.details["amount"], 12.5);

        let overridden = AuditEvent::new(AuditAction::LoginSuccess)
            .severity(AuditSeverity::Critical)
            .client("127.0.0.1", "cli")
            .into_entry(Some(&client));
        assert_eq!(overridden.severity, AuditSeverity::Critical);
        assert_eq!(overridden.ip_address, "127.0.0.1");

        let bare = AuditEvent::new(AuditAction::Logout).into_entry(None);
        assert_eq!(bare.ip_address, UNKNOWN);
        assert_eq!(bare.user_agent, UNKNOWN);
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = AuditEvent::new(AuditAction::RateLimitExceeded).into_entry(None);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(json["severity"], "MEDIUM");
        assert!(json.get("ipAddress").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("userId").is_none());
        let back: AuditLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_filter() {
        let mut old = AuditEvent::new(AuditAction::LoginFailure).into_entry(None);
        old.created_at -= Duration::hours(2);
        let mut mid = AuditEvent::new(AuditAction::UserDeleted).into_entry(None);
        mid.created_at -= Duration::hours(1);
        mid.user_id = Some("u-2".into());
        let new = AuditEvent::new(AuditAction::LoginSuccess).into_entry(None);
        let all = vec![old.clone(), new.clone(), mid.clone()];

        let everything = AuditFilter::default().apply(all.clone());
        assert_eq!(everything, vec![new.clone(), mid.clone(), old.clone()]);

        let serious = AuditFilter {
            min_severity: Some(AuditSeverity::Medium),
            ..Default::default()
        };
        assert_eq!(serious.apply(all.clone()), vec![mid.clone(), old.clone()]);

        let by_user = AuditFilter {
            user_id: Some("u-2".into()),
            ..Default::default()
        };
        assert_eq!(by_user.apply(all.clone()), vec![mid.clone()]);

        let recent = AuditFilter {
            since: Some(Utc::now() - Duration::minutes(90)),
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(recent.apply(all), vec![new]);
    }
}
