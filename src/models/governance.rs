use serde::{Deserialize, Serialize};

/// A free-text policy statement that blocks matching natural-language
/// requests. Rules are independent; evaluation order is first-added.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceRule {
    pub id: String,
    pub rule: String,
    pub is_active: bool,
}

impl GovernanceRule {
    pub fn new(rule: impl Into<String>) -> Self {
        GovernanceRule {
            id: format!("rule_{}", uuid::Uuid::new_v4()),
            rule: rule.into(),
            is_active: true,
        }
    }
}
