//! Notification outbox.
//!
//! Every transactional email is written to the `notifications` table before it
//! is sent, then marked sent, failed or skipped. A failed row keeps the
//! rendered message so an admin can retry it later. Callers never see delivery
//! errors: whatever triggered the email has already been committed.

use crate::db::{DbPool, queries};
use crate::email::{EmailMessage, EmailSendResult, EmailService};
use crate::error::{AppError, Result};
use crate::models::{Notification, NotificationKind, NotificationStatus};

#[derive(Clone)]
pub struct Notifier {
    db: DbPool,
    email: EmailService,
}

impl Notifier {
    pub fn new(db: DbPool, email: EmailService) -> Self {
        Self { db, email }
    }

    pub fn email(&self) -> &EmailService {
        &self.email
    }

    /// Record and send one email. Returns the final outbox row, or None if the
    /// row could not be written.
    pub async fn deliver(
        &self,
        kind: NotificationKind,
        recipient: &str,
        message: &EmailMessage,
        reference_id: Option<&str>,
    ) -> Option<Notification> {
        let created = self.db.get().map_err(AppError::from).and_then(|conn| {
            queries::create_notification(
                &conn,
                &queries::NewNotification {
                    kind,
                    recipient,
                    subject: &message.subject,
                    text_body: &message.text,
                    html_body: &message.html,
                    reference_id,
                },
            )
        });
        let notification = match created {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(
                    kind = kind.as_ref(),
                    error = %e,
                    "Failed to record notification, email not sent"
                );
                return None;
            }
        };
        self.attempt(notification, message).await
    }

    /// Re-send a stored notification that did not go out.
    pub async fn retry(&self, id: &str) -> Result<Notification> {
        let notification = {
            let conn = self.db.get()?;
            queries::get_notification(&conn, id)?
                .ok_or_else(|| AppError::NotFound("Notification not found".into()))?
        };
        if notification.status == NotificationStatus::Sent {
            return Err(AppError::Conflict("Notification was already sent".into()));
        }
        let message = EmailMessage {
            subject: notification.subject.clone(),
            text: notification.text_body.clone(),
            html: notification.html_body.clone(),
        };
        let id = notification.id.clone();
        self.attempt(notification, &message).await;

        let conn = self.db.get()?;
        queries::get_notification(&conn, &id)?
            .ok_or_else(|| AppError::Internal("Notification disappeared during retry".into()))
    }

    async fn attempt(&self, mut notification: Notification, message: &EmailMessage) -> Option<Notification> {
        let (status, error) = match self.email.send(&notification.recipient, message).await {
            Ok(EmailSendResult::Sent) => (NotificationStatus::Sent, None),
            Ok(EmailSendResult::Disabled) => (
                NotificationStatus::Skipped,
                Some("email delivery disabled".to_string()),
            ),
            Ok(EmailSendResult::NoApiKey) => (
                NotificationStatus::Skipped,
                Some("no email API key configured".to_string()),
            ),
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    kind = notification.kind.as_ref(),
                    error = %e,
                    "Email delivery failed, left for retry"
                );
                (NotificationStatus::Failed, Some(e.to_string()))
            }
        };

        let recorded = self.db.get().map_err(AppError::from).and_then(|conn| {
            queries::record_notification_attempt(&conn, &notification.id, status, error.as_deref())
        });
        if let Err(e) = recorded {
            tracing::error!(
                notification_id = %notification.id,
                error = %e,
                "Failed to record notification outcome"
            );
        }

        notification.status = status;
        notification.attempts += 1;
        notification.last_error = error;
        Some(notification)
    }
}
