use serde::{Deserialize, Deserializer, Serialize};

/// A sellable product keyed by its FSN. Every product owns one key pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub fsn: String,
    pub title: String,
    pub download_url: Option<String>,
    /// Slug of the installation guide page
    pub installation_doc: Option<String>,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Product metadata shown to a buyer next to their key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub name: String,
    pub download_url: Option<String>,
    pub installation_doc: Option<String>,
    pub image_url: Option<String>,
}

impl Product {
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            name: self.title.clone(),
            download_url: self.download_url.clone(),
            installation_doc: self
                .installation_doc
                .as_deref()
                .map(|slug| format!("/installation-docs/{}", slug)),
            image_url: self.image_url.clone(),
        }
    }
}

impl ProductSummary {
    /// Used when keys exist for an FSN that has no catalog entry.
    pub fn fallback(fsn: &str) -> Self {
        Self {
            name: fsn.to_string(),
            download_url: None,
            installation_doc: None,
            image_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub fsn: String,
    pub title: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub installation_doc: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Partial update. For the nullable fields an explicit `null` clears the
/// column and an absent field leaves it unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProduct {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub download_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub installation_doc: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub image_url: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
