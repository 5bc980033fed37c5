use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    KeyDelivery,
    WarrantyApproved,
    WarrantyRejected,
    WarrantyResubmission,
    ReplacementApproved,
    ReplacementRejected,
    TicketReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    /// Email delivery disabled or no API key configured
    Skipped,
}

/// One outbound email. The rendered message is stored so a failed send can
/// be retried without rebuilding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    #[serde(skip_serializing)]
    pub text_body: String,
    #[serde(skip_serializing)]
    pub html_body: String,
    /// Order or ticket the message is about
    pub reference_id: Option<String>,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub sent_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub status: Option<NotificationStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}
