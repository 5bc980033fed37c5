use std::env;
use std::time::Duration;

use crate::allocator::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub bootstrap_admin_email: Option<String>,
    pub dev_mode: bool,
    /// Enable/disable audit logging entirely
    pub audit_log_enabled: bool,
    /// Days to retain public audit logs before purging (0 = never purge)
    pub audit_log_retention_days: i64,
    pub email: EmailConfig,
    pub redeem_retry: RetryPolicy,
    /// Mailbox domain used for Office 365 username customizations
    pub customization_domain: String,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub resend_api_key: Option<String>,
    pub resend_api_url: String,
    pub from_email: String,
    pub support_email: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("KEYDESK_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let audit_log_enabled = env::var("AUDIT_LOG_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let audit_log_retention_days: i64 = env::var("AUDIT_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);

        let email = EmailConfig {
            enabled: env::var("EMAIL_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            resend_api_key: env::var("RESEND_API_KEY").ok().filter(|k| !k.is_empty()),
            resend_api_url: env::var("RESEND_API_URL")
                .unwrap_or_else(|_| crate::email::RESEND_API_URL.to_string()),
            from_email: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Keydesk <noreply@keydesk.local>".to_string()),
            support_email: env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@keydesk.local".to_string()),
        };

        let max_attempts: u32 = env::var("REDEEM_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(3);
        let backoff_ms: u64 = env::var("REDEEM_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "keydesk.db".to_string()),
            base_url,
            bootstrap_admin_email: env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            dev_mode,
            audit_log_enabled,
            audit_log_retention_days,
            email,
            redeem_retry: RetryPolicy {
                max_attempts,
                backoff: Duration::from_millis(backoff_ms),
            },
            customization_domain: env::var("CUSTOMIZATION_DOMAIN")
                .unwrap_or_else(|_| "ms365.pro".to_string()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
