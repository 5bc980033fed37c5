use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TicketCategory {
    Order,
    Activation,
    Warranty,
    Refund,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageAuthor {
    Customer,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketTransitionError {
    #[error("Ticket is closed")]
    Closed,
    #[error("Cannot move ticket from {from:?} to {to:?}")]
    Invalid { from: TicketStatus, to: TicketStatus },
}

impl TicketStatus {
    /// Admin status change. Closed is terminal; anything else may move to any
    /// other status.
    pub fn transition(self, to: TicketStatus) -> Result<TicketStatus, TicketTransitionError> {
        match self {
            TicketStatus::Closed => Err(TicketTransitionError::Closed),
            from if from == to => Err(TicketTransitionError::Invalid { from, to }),
            _ => Ok(to),
        }
    }

    /// Status after a customer reply: resolved tickets reopen.
    pub fn on_customer_reply(self) -> Result<TicketStatus, TicketTransitionError> {
        match self {
            TicketStatus::Closed => Err(TicketTransitionError::Closed),
            TicketStatus::Resolved => Ok(TicketStatus::Open),
            other => Ok(other),
        }
    }

    /// Status after an admin reply: an untouched ticket becomes in-progress.
    pub fn on_admin_reply(self) -> Result<TicketStatus, TicketTransitionError> {
        match self {
            TicketStatus::Closed => Err(TicketTransitionError::Closed),
            TicketStatus::Open => Ok(TicketStatus::InProgress),
            other => Ok(other),
        }
    }
}

/// Human-friendly ticket reference, e.g. `TKT-4K7Q2Z`.
pub fn generate_reference() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("TKT-{}", suffix)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub reference: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub order_id: Option<String>,
    pub subject: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub resolved_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: String,
    pub ticket_id: String,
    pub author: MessageAuthor,
    /// Admin id for admin replies
    pub author_id: Option<String>,
    pub body: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct TicketWithMessages {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicket {
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    pub subject: String,
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: TicketPriority,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomerTicketQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomerReply {
    pub email: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminReply {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketStatus {
    pub status: TicketStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketFilter {
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}
