use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored LLM provider API key. The key material is encrypted at rest;
/// `masked_key` is what the UI shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub masked_key: String,
    /// Cleartext key, populated only when loaded for active use.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: u64,
}

pub fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 8 {
        return "****".to_string();
    }
    let head: String = key.chars().take(4).collect();
    let tail: String = key.chars().skip(count - 4).collect();
    format!("{}...{}", head, tail)
}

impl ApiKey {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        ApiKey {
            id: format!("key_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            masked_key: mask_key(&key),
            key,
            is_active: false,
            created_at: Utc::now(),
            last_used: None,
            usage_count: 0,
        }
    }
}
