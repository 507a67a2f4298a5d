use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Pie,
}

/// A chart the UI may render alongside a result set. `labels_column` must be
/// categorical and `data_column` numeric; both must exist in the result's
/// header set or the suggestion is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChartSuggestion {
    pub chart_type: ChartType,
    pub labels_column: String,
    pub data_column: String,
}

/// Uniform tabular shape every connector normalizes its native result set
/// into. Column order is preserved exactly as the backend returned it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TabularResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TabularResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<TabularResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_suggestion: Option<ChartSuggestion>,
}

/// One entry of the append-only conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            sender: Sender::User,
            content: MessageContent {
                text: Some(text.into()),
                ..Default::default()
            },
            timestamp: Utc::now(),
        }
    }

    pub fn ai(content: MessageContent) -> Self {
        ChatMessage {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            sender: Sender::Ai,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn ai_error(error: impl Into<String>) -> Self {
        ChatMessage::ai(MessageContent {
            error: Some(error.into()),
            ..Default::default()
        })
    }
}
