use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

/// Marketplace order identifier in the `NNN-NNNNNNN-NNNNNNN` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid order ID format: expected NNN-NNNNNNN-NNNNNNN")]
pub struct InvalidOrderId;

const GROUPS: [usize; 3] = [3, 7, 7];

impl OrderId {
    /// Strict parse. Surrounding whitespace is ignored, nothing else is.
    pub fn parse(raw: &str) -> Result<Self, InvalidOrderId> {
        let trimmed = raw.trim();
        if is_order_id_format(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidOrderId)
        }
    }

    /// Lenient parse for admin and support lookups: strips inner whitespace
    /// and accepts a bare 17-digit id, reformatting it with dashes.
    pub fn normalize(raw: &str) -> Option<Self> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if is_order_id_format(&compact) {
            return Some(Self(compact));
        }
        let digits: String = compact.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == 17 && digits.len() == compact.replace('-', "").len() {
            return Some(Self(format!(
                "{}-{}-{}",
                &digits[0..3],
                &digits[3..10],
                &digits[10..17]
            )));
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// True if `s` is exactly three dash-separated digit groups of 3, 7 and 7.
pub fn is_order_id_format(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == GROUPS.len()
        && parts
            .iter()
            .zip(GROUPS)
            .all(|(part, len)| part.len() == len && part.bytes().all(|b| b.is_ascii_digit()))
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderId {
    type Error = InvalidOrderId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderId> for String {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

/// What a buyer types on the activation page: either the marketplace order id
/// or the 15-17 digit secret code printed on digital-delivery orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationCode {
    Order(OrderId),
    Secret(String),
}

impl ActivationCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let clean: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if let Ok(id) = OrderId::parse(&clean) {
            return Some(Self::Order(id));
        }
        if is_secret_code(&clean) {
            return Some(Self::Secret(clean));
        }
        None
    }
}

pub fn is_secret_code(s: &str) -> bool {
    (15..=17).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FulfillmentType {
    /// Fulfilled by the marketplace
    Fba,
    /// Merchant fulfilled
    Mfn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_id: String,
    pub secret_code: Option<String>,
    pub fsn: Option<String>,
    pub fulfillment_type: FulfillmentType,
    pub quantity: i32,
    pub order_date: Option<i64>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    /// Set while a feedback/review appeal is open against this order
    pub warranty_blocked: bool,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    pub order_id: String,
    #[serde(default)]
    pub secret_code: Option<String>,
    #[serde(default)]
    pub fsn: Option<String>,
    pub fulfillment_type: FulfillmentType,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub order_date: Option<i64>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    #[serde(default)]
    pub fsn: Option<String>,
    #[serde(default)]
    pub fulfillment_type: Option<FulfillmentType>,
    #[serde(default)]
    pub blocked: Option<bool>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}
