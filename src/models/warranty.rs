use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WarrantyStatus {
    Pending,
    Verified,
    Rejected,
    NeedsResubmission,
}

/// A decision an admin takes on a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WarrantyDecision {
    Approve,
    Reject,
    RequestResubmission {
        #[serde(default)]
        missing_seller_feedback: bool,
        #[serde(default)]
        missing_product_review: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WarrantyTransitionError {
    #[error("Warranty registration is {0:?} and cannot be reviewed")]
    NotReviewable(WarrantyStatus),
    #[error("Resubmission requires at least one missing screenshot")]
    NothingMissing,
    #[error("Warranty registration is {0:?}; only registrations awaiting resubmission accept new proof")]
    NotAwaitingResubmission(WarrantyStatus),
}

impl WarrantyStatus {
    /// Admin edges: pending and needs-resubmission may be approved or rejected;
    /// only pending may be sent back for resubmission.
    pub fn decide(self, decision: WarrantyDecision) -> Result<WarrantyStatus, WarrantyTransitionError> {
        match (self, decision) {
            (WarrantyStatus::Pending | WarrantyStatus::NeedsResubmission, WarrantyDecision::Approve) => {
                Ok(WarrantyStatus::Verified)
            }
            (WarrantyStatus::Pending | WarrantyStatus::NeedsResubmission, WarrantyDecision::Reject) => {
                Ok(WarrantyStatus::Rejected)
            }
            (
                WarrantyStatus::Pending,
                WarrantyDecision::RequestResubmission {
                    missing_seller_feedback,
                    missing_product_review,
                },
            ) => {
                if !missing_seller_feedback && !missing_product_review {
                    return Err(WarrantyTransitionError::NothingMissing);
                }
                Ok(WarrantyStatus::NeedsResubmission)
            }
            (status, _) => Err(WarrantyTransitionError::NotReviewable(status)),
        }
    }

    /// The one customer-driven edge: needs-resubmission back to pending.
    pub fn resubmit(self) -> Result<WarrantyStatus, WarrantyTransitionError> {
        match self {
            WarrantyStatus::NeedsResubmission => Ok(WarrantyStatus::Pending),
            other => Err(WarrantyTransitionError::NotAwaitingResubmission(other)),
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, WarrantyStatus::Verified | WarrantyStatus::Rejected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrantyRegistration {
    pub id: String,
    pub order_id: String,
    pub status: WarrantyStatus,
    /// Phone number or email the buyer left on the form
    pub contact: Option<String>,
    pub customer_email: Option<String>,
    pub seller_feedback_proof: Option<String>,
    pub product_review_proof: Option<String>,
    pub missing_seller_feedback: bool,
    pub missing_product_review: bool,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub reminder_count: i32,
    pub created_at: i64,
    pub updated_at: i64,
    pub verified_at: Option<i64>,
}

impl WarrantyRegistration {
    /// Email to notify: the explicit email, else the contact if it looks like one.
    pub fn notify_email(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or_else(|| self.contact.as_deref().filter(|c| c.contains('@')))
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitWarranty {
    pub order_id: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Reference (URL or storage path) to the seller-feedback screenshot
    pub seller_feedback_proof: String,
    /// Reference to the product-review screenshot
    pub product_review_proof: String,
}

#[derive(Debug, Deserialize)]
pub struct ResubmitWarranty {
    #[serde(default)]
    pub seller_feedback_proof: Option<String>,
    #[serde(default)]
    pub product_review_proof: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewWarranty {
    #[serde(flatten)]
    pub decision: WarrantyDecision,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WarrantyFilter {
    #[serde(default)]
    pub status: Option<WarrantyStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_edges() {
        use WarrantyStatus::*;
        assert_eq!(Pending.decide(WarrantyDecision::Approve), Ok(Verified));
        assert_eq!(Pending.decide(WarrantyDecision::Reject), Ok(Rejected));
        assert_eq!(NeedsResubmission.decide(WarrantyDecision::Approve), Ok(Verified));
        assert_eq!(
            Pending.decide(WarrantyDecision::RequestResubmission {
                missing_seller_feedback: true,
                missing_product_review: false,
            }),
            Ok(NeedsResubmission)
        );
    }

    #[test]
    fn test_final_states_are_closed() {
        use WarrantyStatus::*;
        for status in [Verified, Rejected] {
            assert!(status.is_final());
            assert_eq!(
                status.decide(WarrantyDecision::Approve),
                Err(WarrantyTransitionError::NotReviewable(status))
            );
            assert!(status.resubmit().is_err());
        }
    }

    #[test]
    fn test_resubmission_needs_a_missing_item() {
        assert_eq!(
            WarrantyStatus::Pending.decide(WarrantyDecision::RequestResubmission {
                missing_seller_feedback: false,
                missing_product_review: false,
            }),
            Err(WarrantyTransitionError::NothingMissing)
        );
    }

    #[test]
    fn test_customer_edge_only_from_needs_resubmission() {
        assert_eq!(
            WarrantyStatus::NeedsResubmission.resubmit(),
            Ok(WarrantyStatus::Pending)
        );
        assert!(WarrantyStatus::Pending.resubmit().is_err());
    }

    #[test]
    fn test_review_body_parses() {
        let body: ReviewWarranty = serde_json::from_str(
            r#"{"action":"request_resubmission","missing_product_review":true,"admin_notes":"blurry"}"#,
        )
        .unwrap();
        assert_eq!(
            body.decision,
            WarrantyDecision::RequestResubmission {
                missing_seller_feedback: false,
                missing_product_review: true,
            }
        );
        assert_eq!(body.admin_notes.as_deref(), Some("blurry"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(WarrantyStatus::NeedsResubmission.as_ref(), "needs_resubmission");
        assert_eq!(
            "needs_resubmission".parse::<WarrantyStatus>().unwrap(),
            WarrantyStatus::NeedsResubmission
        );
    }
}
