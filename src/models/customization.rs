use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use unicode_normalization::UnicodeNormalization;

pub const MIN_USERNAME_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CustomizationStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customization {
    pub id: String,
    pub order_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub status: CustomizationStatus,
    /// Mailbox address assigned once the account is provisioned
    pub generated_email: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// NFKC-normalize, trim and lowercase a requested mailbox prefix.
pub fn normalize_username(raw: &str) -> String {
    raw.nfkc().collect::<String>().trim().to_lowercase()
}

/// Checks a normalized username: at least three characters, starting with a
/// letter, then letters, digits, `.`, `_` or `-`.
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err("Username must be at least 3 characters");
    }
    let mut chars = username.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return Err("Username must start with a letter");
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')) {
        return Err("Username may only contain letters, digits, '.', '_' and '-'");
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub username: String,
    pub email: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomizationEligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<Customization>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitCustomization {
    pub order_id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteCustomization {
    #[serde(default)]
    pub generated_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomizationFilter {
    #[serde(default)]
    pub status: Option<CustomizationStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}
