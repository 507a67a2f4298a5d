use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisSettings {
    /// Gemini model identifier used by the LLM-backed synthesizer.
    pub model: String,
    /// Sliding window of prior messages replayed into each synthesis call.
    pub history_window: usize,
    pub timeout_seconds: u64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        SynthesisSettings {
            model: "gemini-2.5-flash".to_string(),
            history_window: 12,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySettings {
    pub default_limit: u32,
    pub timeout_seconds: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            default_limit: 1000,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub synthesis: SynthesisSettings,
    #[serde(default)]
    pub query: QuerySettings,
}
