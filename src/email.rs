//! Transactional email through the Resend API.
//!
//! Messages are rendered here as plain text plus a minimal HTML body. Delivery
//! bookkeeping (outbox rows, retries) lives in `notify`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;
use crate::error::{AppError, Result};

pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of attempting to send an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    /// Accepted by Resend
    Sent,
    /// Email delivery is switched off
    Disabled,
    /// No Resend API key configured
    NoApiKey,
}

/// A rendered message, ready to send or store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Clone)]
pub struct EmailService {
    enabled: bool,
    api_key: Option<String>,
    api_url: String,
    from_email: String,
    support_email: String,
    http_client: Client,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Self {
        let http_client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self {
            enabled: config.enabled,
            api_key: config.resend_api_key.clone(),
            api_url: config.resend_api_url.clone(),
            from_email: config.from_email.clone(),
            support_email: config.support_email.clone(),
            http_client,
        }
    }

    pub fn support_email(&self) -> &str {
        &self.support_email
    }

    /// Send `message` to `to`. Returns `Disabled`/`NoApiKey` without making a
    /// request when delivery is not configured.
    pub async fn send(&self, to: &str, message: &EmailMessage) -> Result<EmailSendResult> {
        if !self.enabled {
            tracing::debug!(to = %to, subject = %message.subject, "Email disabled, skipping");
            return Ok(EmailSendResult::Disabled);
        }
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(to = %to, "No Resend API key configured, cannot send email");
            return Ok(EmailSendResult::NoApiKey);
        };

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![to],
            subject: &message.subject,
            text: &message.text,
            html: &message.html,
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                AppError::Internal(format!("Email service error: {}", e))
            })?;

        if response.status().is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                AppError::Internal("Email service response error".into())
            })?;
            tracing::info!(to = %to, subject = %message.subject, "Email sent via Resend");
            Ok(EmailSendResult::Sent)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Resend API returned error");
            Err(AppError::Internal(format!(
                "Email service error: {} - {}",
                status, body
            )))
        }
    }
}

/// Wrap paragraphs in the shared HTML shell.
fn html_shell(title: &str, body: &str, footer: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">{}</h2>
{}
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">{}</p>
</body>
</html>"#,
        title, body, footer
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub struct KeyDelivery<'a> {
    pub product_name: &'a str,
    pub license_key: &'a str,
    pub order_id: &'a str,
    pub download_url: Option<&'a str>,
    /// Absolute URL of the installation guide
    pub installation_url: Option<String>,
    pub support_email: &'a str,
}

pub fn key_delivery(d: &KeyDelivery<'_>) -> EmailMessage {
    let subject = format!("Your {} license key", d.product_name);
    let mut text = format!(
        "Thank you for your order {}.\n\nYour {} license key:\n\n{}\n",
        d.order_id, d.product_name, d.license_key
    );
    let mut html_body = format!(
        r#"<p>Thank you for your order <strong>{}</strong>.</p>
<p>Your {} license key:</p>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; text-align: center;">
<code style="font-size: 20px; font-weight: bold; letter-spacing: 1px; color: #333;">{}</code>
</div>"#,
        escape(d.order_id),
        escape(d.product_name),
        escape(d.license_key)
    );
    if let Some(url) = d.download_url {
        text.push_str(&format!("\nDownload: {}\n", url));
        html_body.push_str(&format!(
            r#"<p><a href="{}">Download {}</a></p>"#,
            escape(url),
            escape(d.product_name)
        ));
    }
    if let Some(url) = &d.installation_url {
        text.push_str(&format!("Installation guide: {}\n", url));
        html_body.push_str(&format!(
            r#"<p><a href="{}">Installation guide</a></p>"#,
            escape(url)
        ));
    }
    let footer = format!("Need help? Contact {}", d.support_email);
    text.push_str(&format!("\n{}", footer));

    EmailMessage {
        html: html_shell(&subject, &html_body, &escape(&footer)),
        subject,
        text,
    }
}

pub fn warranty_approved(order_id: &str) -> EmailMessage {
    let subject = format!("Warranty activated for order {}", order_id);
    let text = format!(
        "Your warranty registration for order {} has been verified. Your license is now covered.",
        order_id
    );
    EmailMessage {
        html: html_shell(
            &subject,
            &format!(
                "<p>Your warranty registration for order <strong>{}</strong> has been verified. Your license is now covered.</p>",
                escape(order_id)
            ),
            "You are receiving this because you registered a warranty.",
        ),
        subject,
        text,
    }
}

pub fn warranty_rejected(order_id: &str, reason: Option<&str>) -> EmailMessage {
    let subject = format!("Warranty registration for order {}", order_id);
    let reason = reason.unwrap_or("The submitted screenshots could not be verified.");
    let text = format!(
        "We could not verify the warranty registration for order {}.\n\nReason: {}",
        order_id, reason
    );
    EmailMessage {
        html: html_shell(
            &subject,
            &format!(
                "<p>We could not verify the warranty registration for order <strong>{}</strong>.</p><p>Reason: {}</p>",
                escape(order_id),
                escape(reason)
            ),
            "Reply to this email if you believe this is a mistake.",
        ),
        subject,
        text,
    }
}

pub fn warranty_resubmission(
    order_id: &str,
    missing_seller_feedback: bool,
    missing_product_review: bool,
    notes: Option<&str>,
) -> EmailMessage {
    let subject = format!("Action needed: warranty for order {}", order_id);
    let mut missing = Vec::new();
    if missing_seller_feedback {
        missing.push("seller feedback screenshot");
    }
    if missing_product_review {
        missing.push("product review screenshot");
    }
    let missing = missing.join(" and ");
    let mut text = format!(
        "Your warranty registration for order {} needs a new {}.",
        order_id, missing
    );
    let mut body = format!(
        "<p>Your warranty registration for order <strong>{}</strong> needs a new {}.</p>",
        escape(order_id),
        escape(&missing)
    );
    if let Some(notes) = notes {
        text.push_str(&format!("\n\nNote from our team: {}", notes));
        body.push_str(&format!("<p>Note from our team: {}</p>", escape(notes)));
    }
    EmailMessage {
        html: html_shell(&subject, &body, "Upload the missing proof from the warranty page."),
        subject,
        text,
    }
}

pub fn replacement_approved(order_id: &str, license_key: &str, activate_url: &str) -> EmailMessage {
    let subject = format!("Replacement key for order {}", order_id);
    let text = format!(
        "Your replacement request for order {} has been approved.\n\nYour new license key:\n\n{}\n\nYou can also look it up at {}",
        order_id, license_key, activate_url
    );
    let body = format!(
        r#"<p>Your replacement request for order <strong>{}</strong> has been approved.</p>
<p>Your new license key:</p>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; text-align: center;">
<code style="font-size: 20px; font-weight: bold; letter-spacing: 1px; color: #333;">{}</code>
</div>
<p>You can also look it up on the <a href="{}">activation page</a>.</p>"#,
        escape(order_id),
        escape(license_key),
        escape(activate_url)
    );
    EmailMessage {
        html: html_shell(&subject, &body, "The previous key for this order no longer applies."),
        subject,
        text,
    }
}

pub fn replacement_rejected(order_id: &str, reason: &str) -> EmailMessage {
    let subject = format!("Replacement request for order {}", order_id);
    let text = format!(
        "We reviewed the replacement request for order {} and could not approve it.\n\nReason: {}",
        order_id, reason
    );
    EmailMessage {
        html: html_shell(
            &subject,
            &format!(
                "<p>We reviewed the replacement request for order <strong>{}</strong> and could not approve it.</p><p>Reason: {}</p>",
                escape(order_id),
                escape(reason)
            ),
            "Reply to this email if you believe this is a mistake.",
        ),
        subject,
        text,
    }
}

pub fn ticket_reply(reference: &str, subject_line: &str, message: &str) -> EmailMessage {
    let subject = format!("[{}] Re: {}", reference, subject_line);
    let text = format!(
        "{}\n\n-- \nReply on the support page using ticket {}.",
        message, reference
    );
    EmailMessage {
        html: html_shell(
            &subject,
            &format!(
                r#"<p style="white-space: pre-wrap;">{}</p>"#,
                escape(message)
            ),
            &format!("Reply on the support page using ticket {}.", escape(reference)),
        ),
        subject,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_delivery_includes_key_and_links() {
        let msg = key_delivery(&KeyDelivery {
            product_name: "Office 2024",
            license_key: "ABCDE-12345",
            order_id: "408-1234567-1234567",
            download_url: Some("https://example.com/dl"),
            installation_url: Some("https://shop.test/installation-docs/office".into()),
            support_email: "help@shop.test",
        });
        assert_eq!(msg.subject, "Your Office 2024 license key");
        assert!(msg.text.contains("ABCDE-12345"));
        assert!(msg.text.contains("https://example.com/dl"));
        assert!(msg.html.contains("installation-docs/office"));
    }

    #[test]
    fn test_replacement_approved_carries_new_key() {
        let msg = replacement_approved(
            "408-1234567-1234567",
            "NEWKY-12345",
            "https://shop.test/activate",
        );
        assert!(msg.subject.contains("408-1234567-1234567"));
        assert!(msg.text.contains("NEWKY-12345"));
        assert!(msg.html.contains(r#"href="https://shop.test/activate""#));
    }

    #[test]
    fn test_html_is_escaped() {
        let msg = ticket_reply("TKT-AAAAAA", "Help", "<script>x</script>");
        assert!(!msg.html.contains("<script>"));
        assert!(msg.text.contains("<script>"));
    }

    #[test]
    fn test_resubmission_lists_missing_items() {
        let msg = warranty_resubmission("408-1234567-1234567", true, true, None);
        assert!(msg.text.contains("seller feedback screenshot and product review screenshot"));
    }

    #[test]
    fn test_send_without_key_is_skipped() {
        let service = EmailService::new(&EmailConfig {
            enabled: true,
            resend_api_key: None,
            resend_api_url: RESEND_API_URL.into(),
            from_email: "shop@test".into(),
            support_email: "help@test".into(),
        });
        let result = tokio_test::block_on(service.send("a@b.com", &warranty_approved("x")));
        assert_eq!(result.unwrap(), EmailSendResult::NoApiKey);
    }
}
