//! Gemini-backed synthesis strategy.
//!
//! Sends the assembled prompt to the `generateContent` endpoint with a JSON
//! response MIME type, then parses the model's reply strictly as the
//! `{ sql, text, chartType?, labelsColumn?, dataColumn? }` payload. Any
//! deviation from that shape is surfaced as an upstream error with the parse
//! detail attached; there is no silent recovery.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{is_placeholder, prompt, Synthesis, SynthesisRequest, Synthesizer};
use crate::db::ensure_read_only;
use crate::error::{Error, Result};
use crate::models::{ChartSuggestion, ChartType};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiSynthesizer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: String,
}

/// The exact payload the model is instructed to emit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisPayload {
    sql: String,
    text: String,
    #[serde(default)]
    chart_type: Option<ChartType>,
    #[serde(default)]
    labels_column: Option<String>,
    #[serde(default)]
    data_column: Option<String>,
}

impl GeminiSynthesizer {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::NoActiveCredential);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {}", e)))?;

        Ok(GeminiSynthesizer {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    async fn send_request(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: format!("{}\n\nUser request: {}", system_prompt, user_prompt),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };

        let url = format!("{}/{}:generateContent?key={}", self.base_url, self.model, self.api_key);
        log::debug!("calling Gemini at {}", url.replace(&self.api_key, "***"));

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout("AI request")
                } else {
                    Error::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(Error::Upstream(format!("HTTP {}: {}", status, text)));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Upstream(format!("malformed API response: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::Upstream("response contained no candidates".to_string()))
    }
}

/// Strict parse of the model's reply, plus SELECT-only enforcement on the
/// emitted SQL. The `--` clarification placeholder bypasses the SQL guard
/// since it is never executed.
fn parse_synthesis(raw: &str) -> Result<Synthesis> {
    let payload: SynthesisPayload = serde_json::from_str(raw)
        .map_err(|e| Error::Upstream(format!("unparseable synthesis output: {}", e)))?;

    let chart = match (payload.chart_type, payload.labels_column, payload.data_column) {
        (Some(chart_type), Some(labels_column), Some(data_column)) => Some(ChartSuggestion {
            chart_type,
            labels_column,
            data_column,
        }),
        (None, _, _) => None,
        _ => {
            return Err(Error::Upstream(
                "incomplete chart suggestion in synthesis output".to_string(),
            ))
        }
    };

    if !is_placeholder(&payload.sql) {
        ensure_read_only(&payload.sql)?;
    }

    Ok(Synthesis {
        text: payload.text,
        sql: payload.sql,
        chart,
    })
}

#[async_trait::async_trait]
impl Synthesizer for GeminiSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesis> {
        let system_prompt =
            prompt::build_system_prompt(request.schema, request.history, request.dialect);
        let raw = self.send_request(&system_prompt, request.prompt).await?;
        parse_synthesis(&raw)
    }
}
