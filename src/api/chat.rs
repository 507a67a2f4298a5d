//! Chat entry point: resolves per-turn inputs, picks the synthesis strategy,
//! and hands the turn to the connection's orchestrator.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::ChatMessage;
use crate::orchestrator::TurnContext;
use crate::state::AppState;
use crate::store;
use crate::synth::{GeminiSynthesizer, HeuristicSynthesizer, Synthesizer};

/// Run one chat turn against a saved connection. Strategy selection: an
/// active API key routes to the Gemini path; otherwise the deterministic
/// fallback answers offline.
pub async fn send_message(
    state: &AppState,
    connection_id: &str,
    prompt: &str,
) -> Result<ChatMessage> {
    let config = state
        .get_config(connection_id)
        .ok_or_else(|| Error::Config(format!("unknown connection: {}", connection_id)))?;

    // Everything the turn needs is loaded before the first await, so the
    // store lock is never held across one
    let (schema, rules, settings, active_key) = {
        let db = state.metadata_db.lock().unwrap();
        let schema = store::load_connections(&db, &state.cipher)?
            .into_iter()
            .find(|r| r.config.id == connection_id)
            .map(|r| r.schema)
            .unwrap_or_default();
        let rules = store::load_rules(&db)?;
        let settings = store::load_settings(&db)?;
        let active_key = store::load_api_keys(&db, &state.cipher)?
            .into_iter()
            .find(|k| k.is_active);
        (schema, rules, settings, active_key)
    };

    let synthesizer: Box<dyn Synthesizer> = match &active_key {
        Some(key) => Box::new(GeminiSynthesizer::new(
            &key.key,
            &settings.synthesis.model,
            Duration::from_secs(settings.synthesis.timeout_seconds),
        )?),
        None => Box::new(HeuristicSynthesizer),
    };

    let orchestrator = state.conversation(connection_id);
    let ai = orchestrator
        .send(
            prompt,
            &TurnContext {
                config: &config,
                schema: &schema,
                rules: &rules,
                synthesizer: synthesizer.as_ref(),
                settings: &settings,
            },
        )
        .await;

    // Count a use once synthesis actually produced output for this turn
    if let Some(key) = active_key {
        if ai.content.sql.is_some() {
            let db = state.metadata_db.lock().unwrap();
            store::record_api_key_usage(&db, &key.id)?;
        }
    }

    Ok(ai)
}

/// Full conversation log for a connection, oldest first.
pub async fn conversation_log(state: &AppState, connection_id: &str) -> Vec<ChatMessage> {
    state.conversation(connection_id).messages().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConnectionConfig, ConnectionRecord, ConnectionStatus, DatabaseKind, TableSchema,
    };

    #[tokio::test]
    async fn unknown_connection_is_a_config_error() {
        let state = AppState::in_memory().unwrap();
        assert!(matches!(
            send_message(&state, "db_404", "how many patients").await.err(),
            Some(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn empty_schema_yields_a_clarification_turn() {
        let state = AppState::in_memory().unwrap();
        let config = ConnectionConfig {
            id: "db_1".into(),
            name: "empty".into(),
            kind: DatabaseKind::Sqlite,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            file_path: Some("unused.db".into()),
            file_content: None,
        };
        {
            let db = state.metadata_db.lock().unwrap();
            store::save_connection(
                &db,
                &state.cipher,
                &ConnectionRecord {
                    config: config.clone(),
                    status: ConnectionStatus::Disconnected,
                    schema: Vec::<TableSchema>::new(),
                },
            )
            .unwrap();
        }
        state.set_config(config);

        let ai = send_message(&state, "db_1", "how many patients").await.unwrap();
        assert!(ai.content.sql.as_deref().unwrap().starts_with("--"));
        assert!(ai.content.results.is_none());

        let log = conversation_log(&state, "db_1").await;
        assert_eq!(log.len(), 2);
    }
}
