use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseKey {
    pub id: String,
    pub license_key: String,
    pub fsn: String,
    pub is_redeemed: bool,
    pub order_id: Option<String>,
    pub created_at: i64,
    pub redeemed_at: Option<i64>,
    /// Set when an approved replacement superseded this key. The key stays
    /// redeemed against its order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_at: Option<i64>,
}

/// Keys move `Available -> Redeemed -> Replaced` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyState {
    Available,
    Redeemed,
    Replaced,
}

impl LicenseKey {
    pub fn state(&self) -> KeyState {
        match (self.is_redeemed, self.replaced_at) {
            (false, _) => KeyState::Available,
            (true, None) => KeyState::Redeemed,
            (true, Some(_)) => KeyState::Replaced,
        }
    }

    /// Redeemed for `order_id` and not superseded by a replacement.
    pub fn is_live_for(&self, order_id: &str) -> bool {
        self.is_redeemed && self.replaced_at.is_none() && self.order_id.as_deref() == Some(order_id)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LicenseKeyFilter {
    #[serde(default)]
    pub fsn: Option<String>,
    #[serde(default)]
    pub redeemed: Option<bool>,
    /// Substring match against the key or its order id
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Stock counts for one key pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStockStats {
    pub fsn: String,
    pub title: Option<String>,
    pub total: i64,
    pub available: i64,
    pub redeemed: i64,
}
