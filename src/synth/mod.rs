//! Natural-language to SQL synthesis.
//!
//! Two interchangeable strategies sit behind [`Synthesizer`]: a Gemini-backed
//! client used when an active API key exists, and a deterministic rule-based
//! fallback for offline/no-credential operation. Both emit SELECT-only SQL,
//! an explanation, and an optional chart suggestion.

pub mod gemini;
pub mod heuristic;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ChartSuggestion, ChatMessage, DatabaseKind, TableSchema};

pub use gemini::GeminiSynthesizer;
pub use heuristic::HeuristicSynthesizer;

/// Everything a strategy needs to produce SQL for one turn.
#[derive(Debug)]
pub struct SynthesisRequest<'a> {
    pub prompt: &'a str,
    pub schema: &'a [TableSchema],
    /// Prior conversation, already windowed by the caller.
    pub history: &'a [ChatMessage],
    pub dialect: DatabaseKind,
}

/// Output of a synthesis call. `sql` may be a non-executable comment
/// placeholder when the request could not be mapped to a table; callers must
/// check [`is_placeholder`] before executing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Synthesis {
    pub text: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSuggestion>,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesis>;
}

/// SQL starting with `--` is a clarification sentinel and must not be
/// executed. Matched on the raw string, no trimming.
pub fn is_placeholder(sql: &str) -> bool {
    sql.starts_with("--")
}

/// Last `window` messages of the conversation, oldest first.
pub fn recent_history(history: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}
