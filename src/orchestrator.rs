//! Chat turn orchestration.
//!
//! A turn runs governance, synthesis, and execution in order, and appends
//! exactly one AI message whatever the outcome. Turns for one conversation
//! are strictly serialized: the conversation log's async lock is held for
//! the whole turn, so a second `send` queues behind the first instead of
//! interleaving.

use std::sync::Arc;
use std::time::Duration;

use crate::db::ConnectorRegistry;
use crate::error::{Error, Result};
use crate::governance::{self, Verdict};
use crate::models::{
    AppSettings, ChatMessage, ConnectionConfig, GovernanceRule, MessageContent, TableSchema,
};
use crate::synth::{self, SynthesisRequest, Synthesizer};

/// Per-turn inputs resolved by the caller: the target connection, its cached
/// schema snapshot, the active rule set, and the chosen synthesis strategy.
pub struct TurnContext<'a> {
    pub config: &'a ConnectionConfig,
    pub schema: &'a [TableSchema],
    pub rules: &'a [GovernanceRule],
    pub synthesizer: &'a dyn Synthesizer,
    pub settings: &'a AppSettings,
}

pub struct ChatOrchestrator {
    registry: Arc<ConnectorRegistry>,
    messages: tokio::sync::Mutex<Vec<ChatMessage>>,
}

impl ChatOrchestrator {
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        ChatOrchestrator {
            registry,
            messages: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    /// Process one user turn. Appends the user message, runs the pipeline,
    /// and appends the single resulting AI message, which is also returned.
    pub async fn send(&self, user_text: &str, turn: &TurnContext<'_>) -> ChatMessage {
        let mut log = self.messages.lock().await;

        // History for synthesis is the conversation before this turn
        let history = log.clone();
        log.push(ChatMessage::user(user_text));

        let ai = match self.run_turn(user_text, &history, turn).await {
            Ok(content) => ChatMessage::ai(content),
            Err(e) => {
                log::warn!("turn failed: {}", e);
                ChatMessage::ai_error(e.to_string())
            }
        };
        log.push(ai.clone());
        ai
    }

    async fn run_turn(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        turn: &TurnContext<'_>,
    ) -> Result<MessageContent> {
        if let Verdict::Block(rule) = governance::evaluate(prompt, turn.rules) {
            return Err(Error::GovernanceViolation(rule));
        }

        let windowed = synth::recent_history(history, turn.settings.synthesis.history_window);
        let request = SynthesisRequest {
            prompt,
            schema: turn.schema,
            history: windowed,
            dialect: turn.config.kind,
        };
        let synthesis = tokio::time::timeout(
            Duration::from_secs(turn.settings.synthesis.timeout_seconds),
            turn.synthesizer.synthesize(&request),
        )
        .await
        .map_err(|_| Error::Timeout("synthesis"))??;

        // Clarification sentinel: surface the question, execute nothing
        if synth::is_placeholder(&synthesis.sql) {
            return Ok(MessageContent {
                text: Some(synthesis.text),
                sql: Some(synthesis.sql),
                ..Default::default()
            });
        }

        self.registry.connect(turn.config).await?;
        let execution = tokio::time::timeout(
            Duration::from_secs(turn.settings.query.timeout_seconds),
            self.registry.execute(&turn.config.id, &synthesis.sql),
        )
        .await
        .map_err(|_| Error::Timeout("query execution"));

        // The handle is released whether execution succeeded or not
        if let Err(e) = self.registry.disconnect(&turn.config.id).await {
            log::warn!("disconnect after turn failed for {}: {}", turn.config.id, e);
        }
        let mut results = execution??;

        let row_limit = turn.settings.query.default_limit as usize;
        if results.rows.len() > row_limit {
            log::debug!(
                "truncating result set from {} to {} rows",
                results.rows.len(),
                row_limit
            );
            results.rows.truncate(row_limit);
        }

        // A tentative chart survives only when there are rows to plot and
        // both named columns actually came back
        let chart_suggestion = synthesis.chart.filter(|c| {
            !results.is_empty()
                && results.headers.iter().any(|h| *h == c.labels_column)
                && results.headers.iter().any(|h| *h == c.data_column)
        });

        Ok(MessageContent {
            text: Some(synthesis.text),
            sql: Some(synthesis.sql),
            results: Some(results),
            error: None,
            chart_suggestion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChartSuggestion, ChartType, DatabaseKind, Sender,
    };
    use crate::synth::Synthesis;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSynthesizer {
        output: Synthesis,
        calls: AtomicUsize,
    }

    impl FixedSynthesizer {
        fn new(output: Synthesis) -> Self {
            FixedSynthesizer {
                output,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Synthesizer for FixedSynthesizer {
        async fn synthesize(&self, _request: &SynthesisRequest<'_>) -> Result<Synthesis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    fn sqlite_fixture() -> (tempfile::NamedTempFile, ConnectionConfig) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = rusqlite::Connection::open(file.path()).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE patients (
                id INTEGER PRIMARY KEY, first_name TEXT, last_name TEXT,
                date_of_birth TEXT, gender TEXT
            );
            INSERT INTO patients VALUES
                (1, 'Ana', 'Silva', '1990-01-01', 'Female'),
                (2, 'Ben', 'Jones', '1985-06-15', 'Male'),
                (3, 'Cara', 'Lopez', '1972-11-30', 'Female'),
                (4, 'Dan', 'Nguyen', '2001-03-22', 'Male');
            "#,
        )
        .unwrap();

        let config = ConnectionConfig {
            id: "db_fixture".into(),
            name: "fixture".into(),
            kind: DatabaseKind::Sqlite,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            file_path: Some(file.path().to_string_lossy().into_owned()),
            file_content: None,
        };
        (file, config)
    }

    fn schema() -> Vec<TableSchema> {
        vec![TableSchema::new(
            "patients",
            vec![
                ("id", "INTEGER"),
                ("first_name", "TEXT"),
                ("last_name", "TEXT"),
                ("date_of_birth", "TEXT"),
                ("gender", "TEXT"),
            ],
        )]
    }

    #[tokio::test]
    async fn blocked_turn_appends_one_error_and_skips_synthesis() {
        let (_file, config) = sqlite_fixture();
        let orchestrator = ChatOrchestrator::new(Arc::new(ConnectorRegistry::new()));
        let synthesizer = FixedSynthesizer::new(Synthesis {
            text: "unused".into(),
            sql: "SELECT 1;".into(),
            chart: None,
        });
        let rules = vec![GovernanceRule::new("Block queries on the appointments table")];
        let schema = schema();
        let settings = AppSettings::default();

        let ai = orchestrator
            .send(
                "list upcoming appointments",
                &TurnContext {
                    config: &config,
                    schema: &schema,
                    rules: &rules,
                    synthesizer: &synthesizer,
                    settings: &settings,
                },
            )
            .await;

        assert!(ai.content.error.as_deref().unwrap().contains("appointments"));
        assert!(ai.content.sql.is_none());
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 0);

        let log = orchestrator.messages().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sender, Sender::User);
        assert_eq!(log[1].sender, Sender::Ai);
    }

    #[tokio::test]
    async fn placeholder_sql_is_surfaced_but_never_executed() {
        let (_file, config) = sqlite_fixture();
        let registry = Arc::new(ConnectorRegistry::new());
        let orchestrator = ChatOrchestrator::new(registry.clone());
        let synthesizer = FixedSynthesizer::new(Synthesis {
            text: "Which table did you mean?".into(),
            sql: "-- unable to determine which table to query".into(),
            chart: None,
        });
        let schema = schema();
        let settings = AppSettings::default();

        let ai = orchestrator
            .send(
                "tell me about the universe",
                &TurnContext {
                    config: &config,
                    schema: &schema,
                    rules: &[],
                    synthesizer: &synthesizer,
                    settings: &settings,
                },
            )
            .await;

        assert!(ai.content.sql.as_deref().unwrap().starts_with("--"));
        assert!(ai.content.results.is_none());
        assert!(!registry.is_connected(&config.id));
    }

    #[tokio::test]
    async fn successful_turn_bundles_sql_results_and_chart() {
        let (_file, config) = sqlite_fixture();
        let orchestrator = ChatOrchestrator::new(Arc::new(ConnectorRegistry::new()));
        let synthesizer = FixedSynthesizer::new(Synthesis {
            text: "Patients by gender.".into(),
            sql: "SELECT gender, COUNT(*) AS gender_count FROM patients \
                  GROUP BY gender ORDER BY gender_count DESC, gender DESC;"
                .into(),
            chart: Some(ChartSuggestion {
                chart_type: ChartType::Bar,
                labels_column: "gender".into(),
                data_column: "gender_count".into(),
            }),
        });
        let schema = schema();
        let settings = AppSettings::default();

        let ai = orchestrator
            .send(
                "patients by gender",
                &TurnContext {
                    config: &config,
                    schema: &schema,
                    rules: &[],
                    synthesizer: &synthesizer,
                    settings: &settings,
                },
            )
            .await;

        let results = ai.content.results.unwrap();
        assert_eq!(results.headers, vec!["gender", "gender_count"]);
        assert_eq!(
            results.rows,
            vec![
                vec![serde_json::json!("Male"), serde_json::json!(2)],
                vec![serde_json::json!("Female"), serde_json::json!(2)],
            ]
        );
        assert!(ai.content.chart_suggestion.is_some());
        assert!(ai.content.error.is_none());
    }

    #[tokio::test]
    async fn chart_is_dropped_when_no_rows_come_back() {
        let (_file, config) = sqlite_fixture();
        let orchestrator = ChatOrchestrator::new(Arc::new(ConnectorRegistry::new()));
        let synthesizer = FixedSynthesizer::new(Synthesis {
            text: "Nobody matches.".into(),
            sql: "SELECT gender, COUNT(*) AS gender_count FROM patients \
                  WHERE id > 100 GROUP BY gender;"
                .into(),
            chart: Some(ChartSuggestion {
                chart_type: ChartType::Pie,
                labels_column: "gender".into(),
                data_column: "gender_count".into(),
            }),
        });
        let schema = schema();
        let settings = AppSettings::default();

        let ai = orchestrator
            .send(
                "gender distribution of patients over 100",
                &TurnContext {
                    config: &config,
                    schema: &schema,
                    rules: &[],
                    synthesizer: &synthesizer,
                    settings: &settings,
                },
            )
            .await;

        assert!(ai.content.chart_suggestion.is_none());
        assert!(ai.content.results.unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn failed_execution_still_releases_the_handle() {
        let (_file, config) = sqlite_fixture();
        let registry = Arc::new(ConnectorRegistry::new());
        let orchestrator = ChatOrchestrator::new(registry.clone());
        let synthesizer = FixedSynthesizer::new(Synthesis {
            text: "bad".into(),
            sql: "SELECT nope FROM not_a_table;".into(),
            chart: None,
        });
        let schema = schema();
        let settings = AppSettings::default();

        let ai = orchestrator
            .send(
                "query the patients table",
                &TurnContext {
                    config: &config,
                    schema: &schema,
                    rules: &[],
                    synthesizer: &synthesizer,
                    settings: &settings,
                },
            )
            .await;

        assert!(ai.content.error.is_some());
        assert!(!registry.is_connected(&config.id));

        let log = orchestrator.messages().await;
        assert_eq!(log.len(), 2);
    }
}
