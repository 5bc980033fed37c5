//! Shared helpers for handlers.

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{ActorType, AuditAction, AuditActor};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns None if the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Fluent audit log writer.
///
/// ```ignore
/// AuditLogBuilder::new(&conn, state.audit_log_enabled, &headers)
///     .actor(ActorType::Admin, Some(&ctx.admin.id))
///     .action(AuditAction::ImportKeys)
///     .resource("product", &fsn)
///     .save();
/// ```
///
/// Entries are written after the audited change has committed, so a failed
/// insert is logged and never surfaces to the caller.
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    actor_type: ActorType,
    actor: AuditActor,
    action: Option<AuditAction>,
    resource_type: &'a str,
    resource_id: String,
    details: Option<serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    pub fn new(conn: &'a Connection, enabled: bool, headers: &HeaderMap) -> Self {
        let (ip_address, user_agent) = extract_request_info(headers);
        Self {
            conn,
            enabled,
            actor_type: ActorType::System,
            actor: AuditActor {
                ip_address,
                user_agent,
                ..Default::default()
            },
            action: None,
            resource_type: "",
            resource_id: String::new(),
            details: None,
        }
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: Option<&str>) -> Self {
        self.actor_type = actor_type;
        self.actor.actor_id = actor_id.map(String::from);
        self
    }

    pub fn actor_email(mut self, email: Option<&str>) -> Self {
        self.actor.actor_email = email.map(String::from);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn resource(mut self, resource_type: &'a str, resource_id: &str) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id.to_string();
        self
    }

    pub fn details(mut self, details: &serde_json::Value) -> Self {
        self.details = Some(details.clone());
        self
    }

    pub fn save(self) {
        let Some(action) = self.action else {
            tracing::warn!("Audit log entry without action dropped");
            return;
        };
        if let Err(e) = queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_type,
            &self.actor,
            action,
            self.resource_type,
            &self.resource_id,
            self.details.as_ref(),
        ) {
            tracing::error!(
                action = action.as_ref(),
                resource_type = self.resource_type,
                resource_id = %self.resource_id,
                error = %e,
                "Failed to write audit log"
            );
        }
    }
}

/// Loose email check: one `@`, non-empty local part, dotted domain, no spaces.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Normalize an Indian mobile number to `+91XXXXXXXXXX`. Accepts spaces and
/// dashes, a `+91`/`91` prefix, or a bare 10-digit number.
pub fn normalize_indian_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = compact
        .strip_prefix("+91")
        .or_else(|| (compact.len() == 12).then(|| compact.strip_prefix("91")).flatten())
        .unwrap_or(&compact);
    (digits.len() == 10 && digits.bytes().all(|b| b.is_ascii_digit()))
        .then(|| format!("+91{}", digits))
}

/// Join a site-relative path onto the public base URL.
pub fn absolute_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
