use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

/// `Pending -> Approved | Rejected`. Both outcomes are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReplacementStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("This request has already been {}", .0.as_ref())]
pub struct AlreadyProcessed(pub ReplacementStatus);

impl ReplacementStatus {
    pub fn decide(self, decision: ReplacementDecision) -> Result<ReplacementStatus, AlreadyProcessed> {
        if self != ReplacementStatus::Pending {
            return Err(AlreadyProcessed(self));
        }
        Ok(match decision {
            ReplacementDecision::Approve => ReplacementStatus::Approved,
            ReplacementDecision::Reject => ReplacementStatus::Rejected,
        })
    }
}

/// A buyer's report that their issued key does not activate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementRequest {
    pub id: String,
    pub order_id: String,
    pub fsn: String,
    pub customer_email: String,
    /// Screenshot reference of the activation error
    pub proof: String,
    pub status: ReplacementStatus,
    pub admin_notes: Option<String>,
    pub original_key_id: String,
    pub new_key_id: Option<String>,
    pub created_at: i64,
    pub reviewed_at: Option<i64>,
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitReplacement {
    pub order_id: String,
    pub customer_email: String,
    pub proof: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewReplacement {
    pub action: ReplacementDecision,
    #[serde(default)]
    pub admin_notes: Option<String>,
    /// Specific available key to hand out; the first available key of the
    /// product is used when absent
    #[serde(default)]
    pub license_key_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplacementFilter {
    #[serde(default)]
    pub status: Option<ReplacementStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplacementStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_is_decided() {
        assert_eq!(
            ReplacementStatus::Pending.decide(ReplacementDecision::Approve),
            Ok(ReplacementStatus::Approved)
        );
        assert_eq!(
            ReplacementStatus::Pending.decide(ReplacementDecision::Reject),
            Ok(ReplacementStatus::Rejected)
        );
        for status in [ReplacementStatus::Approved, ReplacementStatus::Rejected] {
            assert_eq!(
                status.decide(ReplacementDecision::Approve),
                Err(AlreadyProcessed(status))
            );
        }
    }

    #[test]
    fn test_already_processed_message() {
        assert_eq!(
            AlreadyProcessed(ReplacementStatus::Approved).to_string(),
            "This request has already been approved"
        );
    }
}
