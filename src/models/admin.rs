use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdminRole {
    /// Full access, including admin management and key purges
    Owner,
    /// Day-to-day support work
    Support,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: AdminRole,
    /// First characters of the API key, used for lookup
    pub api_key_prefix: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub created_at: i64,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdmin {
    pub email: String,
    pub name: String,
    pub role: AdminRole,
}

#[derive(Debug, Serialize)]
pub struct CreatedAdmin {
    pub admin: Admin,
    /// Shown once; only the hash is stored
    pub api_key: String,
}
