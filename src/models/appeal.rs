use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppealKind {
    /// Negative seller feedback
    Feedback,
    /// Negative product review
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
    Resubmit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefundPreference {
    None,
    Full,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealDecision {
    Approve,
    Reject,
    Resubmit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppealTransitionError {
    #[error("An appeal for this order is already under review")]
    AlreadyPending,
    #[error("This appeal has already been approved")]
    AlreadyApproved,
    #[error("Appeal is {0:?}; only pending appeals can be reviewed")]
    NotPending(AppealStatus),
}

impl AppealStatus {
    /// Customer (re)submission. A missing appeal counts as a fresh one.
    pub fn submit(current: Option<AppealStatus>) -> Result<AppealStatus, AppealTransitionError> {
        match current {
            None | Some(AppealStatus::Rejected) | Some(AppealStatus::Resubmit) => {
                Ok(AppealStatus::Pending)
            }
            Some(AppealStatus::Pending) => Err(AppealTransitionError::AlreadyPending),
            Some(AppealStatus::Approved) => Err(AppealTransitionError::AlreadyApproved),
        }
    }

    pub fn decide(self, decision: AppealDecision) -> Result<AppealStatus, AppealTransitionError> {
        if self != AppealStatus::Pending {
            return Err(AppealTransitionError::NotPending(self));
        }
        Ok(match decision {
            AppealDecision::Approve => AppealStatus::Approved,
            AppealDecision::Reject => AppealStatus::Rejected,
            AppealDecision::Resubmit => AppealStatus::Resubmit,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appeal {
    pub id: String,
    pub order_id: String,
    pub kind: AppealKind,
    pub status: AppealStatus,
    pub proof: Option<String>,
    pub customer_phone: Option<String>,
    pub refund_preference: RefundPreference,
    pub refund_amount: Option<f64>,
    pub admin_notes: Option<String>,
    pub initiated_by_admin: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAppeal {
    pub order_id: String,
    pub kind: AppealKind,
    /// Screenshot reference showing the feedback/review was removed
    pub proof: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default = "default_refund_preference")]
    pub refund_preference: RefundPreference,
    #[serde(default)]
    pub refund_amount: Option<f64>,
}

fn default_refund_preference() -> RefundPreference {
    RefundPreference::None
}

impl SubmitAppeal {
    /// A partial refund needs a positive amount; other preferences ignore it.
    pub fn refund_amount(&self) -> Result<Option<f64>, &'static str> {
        match self.refund_preference {
            RefundPreference::Partial => match self.refund_amount {
                Some(amount) if amount > 0.0 => Ok(Some(amount)),
                _ => Err("Partial refund requires a positive refund_amount"),
            },
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InitiateAppeal {
    pub order_id: String,
    pub kind: AppealKind,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewAppeal {
    pub action: AppealDecision,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppealFilter {
    #[serde(default)]
    pub status: Option<AppealStatus>,
    #[serde(default)]
    pub kind: Option<AppealKind>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AppealStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub resubmit: i64,
}
