//! Deterministic rule-based synthesis, used when no API key is active.
//!
//! Intentionally simple substring/keyword matching, not a parser. Intent
//! precedence: grouping ("by"/"per") over distribution ("breakdown"/
//! "distribution") over row count ("how many"/"count") over a plain top-N
//! listing. By construction it only ever emits a SELECT statement or the
//! `--` clarification placeholder.

use async_trait::async_trait;

use super::{Synthesis, SynthesisRequest, Synthesizer};
use crate::error::Result;
use crate::models::{ChartSuggestion, ChartType, ColumnSchema, DatabaseKind, TableSchema};

pub struct HeuristicSynthesizer;

#[async_trait]
impl Synthesizer for HeuristicSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesis> {
        Ok(synthesize_offline(request))
    }
}

fn synthesize_offline(request: &SynthesisRequest<'_>) -> Synthesis {
    let prompt_lower = request.prompt.to_lowercase();

    let table = match recognize_table(&prompt_lower, request.schema) {
        Some(t) => t,
        None => return clarification(request.schema),
    };

    if let Some(column) = grouping_column(&prompt_lower, table) {
        return group_by_query(table, column, ChartType::Bar);
    }

    if prompt_lower.contains("breakdown") || prompt_lower.contains("distribution") {
        if let Some(column) = first_categorical_column(table) {
            return group_by_query(table, column, ChartType::Pie);
        }
    }

    if prompt_lower.contains("how many") || word_present(&prompt_lower, "count") {
        return count_query(table);
    }

    listing_query(table, request.dialect)
}

/// First table whose name (case-insensitive, underscores read as spaces)
/// appears literally in the prompt.
fn recognize_table<'a>(prompt_lower: &str, schema: &'a [TableSchema]) -> Option<&'a TableSchema> {
    schema.iter().find(|table| {
        let name = table.table_name.to_lowercase();
        prompt_lower.contains(&name) || prompt_lower.contains(&name.replace('_', " "))
    })
}

fn word_present(prompt_lower: &str, word: &str) -> bool {
    prompt_lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|w| w == word)
}

/// A declared column mentioned after a whole-word "by"/"per" marker. Word
/// tokenization keeps "baby" from reading as a grouping marker.
fn grouping_column<'a>(prompt_lower: &str, table: &'a TableSchema) -> Option<&'a ColumnSchema> {
    let words: Vec<&str> = prompt_lower.split_whitespace().collect();
    let marker = words.iter().position(|w| {
        let w = w.trim_matches(|c: char| !c.is_alphanumeric());
        w == "by" || w == "per"
    })?;
    let tail = words[marker + 1..].join(" ");

    table.columns.iter().find(|c| {
        let name = c.name.to_lowercase().replace('_', " ");
        tail.contains(&name)
    })
}

/// First non-id, non-name column with a textual or boolean declared type.
fn first_categorical_column(table: &TableSchema) -> Option<&ColumnSchema> {
    table.columns.iter().find(|c| {
        let name = c.name.to_lowercase();
        if name == "id" || name.ends_with("_id") || name.contains("name") {
            return false;
        }
        let data_type = c.data_type.to_lowercase();
        ["char", "text", "bool", "enum"]
            .iter()
            .any(|t| data_type.contains(t))
    })
}

fn group_by_query(table: &TableSchema, column: &ColumnSchema, chart_type: ChartType) -> Synthesis {
    let t = &table.table_name;
    let col = &column.name;
    // Ties break on the label, descending, so equal counts come out in a
    // stable order regardless of backend scan order.
    let sql = format!(
        "SELECT {col}, COUNT(*) AS {col}_count FROM {t} GROUP BY {col} ORDER BY {col}_count DESC, {col} DESC;",
    );
    Synthesis {
        text: format!("Here is the count of rows in \"{}\" grouped by {}.", t, col),
        sql,
        chart: Some(ChartSuggestion {
            chart_type,
            labels_column: col.clone(),
            data_column: format!("{}_count", col),
        }),
    }
}

fn count_query(table: &TableSchema) -> Synthesis {
    Synthesis {
        text: format!("Counting all rows in \"{}\".", table.table_name),
        sql: format!("SELECT COUNT(*) AS total_count FROM {};", table.table_name),
        chart: None,
    }
}

fn listing_query(table: &TableSchema, dialect: DatabaseKind) -> Synthesis {
    let columns = table
        .columns
        .iter()
        .take(5)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let columns = if columns.is_empty() { "*".to_string() } else { columns };

    let sql = match dialect {
        DatabaseKind::SqlServer => {
            format!("SELECT TOP 10 {} FROM {};", columns, table.table_name)
        }
        _ => format!("SELECT {} FROM {} LIMIT 10;", columns, table.table_name),
    };
    Synthesis {
        text: format!("Showing the first rows of \"{}\".", table.table_name),
        sql,
        chart: None,
    }
}

fn clarification(schema: &[TableSchema]) -> Synthesis {
    let names = schema
        .iter()
        .map(|t| t.table_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Synthesis {
        text: format!(
            "I couldn't tell which table you meant. Available tables: {}. \
             Could you rephrase your question to name one of them?",
            names
        ),
        sql: "-- unable to determine which table to query".to_string(),
        chart: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use crate::synth::is_placeholder;
    use proptest::prelude::*;

    fn patients_schema() -> Vec<TableSchema> {
        vec![
            TableSchema::new(
                "patients",
                vec![
                    ("id", "INTEGER"),
                    ("first_name", "VARCHAR"),
                    ("last_name", "VARCHAR"),
                    ("date_of_birth", "DATE"),
                    ("gender", "VARCHAR"),
                ],
            ),
            TableSchema::new(
                "appointments",
                vec![
                    ("id", "INTEGER"),
                    ("patient_id", "INTEGER"),
                    ("scheduled_for", "TIMESTAMP"),
                    ("status", "VARCHAR"),
                ],
            ),
        ]
    }

    fn request<'a>(
        prompt: &'a str,
        schema: &'a [TableSchema],
        dialect: DatabaseKind,
    ) -> SynthesisRequest<'a> {
        SynthesisRequest {
            prompt,
            schema,
            history: &[],
            dialect,
        }
    }

    static NO_HISTORY: [ChatMessage; 0] = [];

    #[test]
    fn how_many_becomes_a_count_query() {
        let schema = patients_schema();
        let out = synthesize_offline(&request(
            "how many patients are there",
            &schema,
            DatabaseKind::PostgreSql,
        ));
        assert_eq!(out.sql, "SELECT COUNT(*) AS total_count FROM patients;");
        assert!(out.chart.is_none());
    }

    #[test]
    fn by_marker_becomes_a_grouped_bar_query() {
        let schema = patients_schema();
        let out = synthesize_offline(&request(
            "patients by gender",
            &schema,
            DatabaseKind::PostgreSql,
        ));
        assert_eq!(
            out.sql,
            "SELECT gender, COUNT(*) AS gender_count FROM patients \
             GROUP BY gender ORDER BY gender_count DESC, gender DESC;"
        );
        assert_eq!(
            out.chart,
            Some(ChartSuggestion {
                chart_type: ChartType::Bar,
                labels_column: "gender".to_string(),
                data_column: "gender_count".to_string(),
            })
        );
    }

    #[test]
    fn distribution_picks_first_categorical_column_for_pie() {
        let schema = patients_schema();
        let out = synthesize_offline(&request(
            "show the gender distribution of patients",
            &schema,
            DatabaseKind::PostgreSql,
        ));
        // id and the *_name columns are skipped; gender is the first eligible
        assert!(out.sql.contains("GROUP BY gender"));
        assert_eq!(
            out.chart.as_ref().map(|c| c.chart_type),
            Some(ChartType::Pie)
        );
    }

    #[test]
    fn baby_is_not_a_grouping_marker() {
        let schema = patients_schema();
        let out = synthesize_offline(&request(
            "count the baby patients",
            &schema,
            DatabaseKind::PostgreSql,
        ));
        assert_eq!(out.sql, "SELECT COUNT(*) AS total_count FROM patients;");
    }

    #[test]
    fn default_intent_is_a_dialect_correct_listing() {
        let schema = patients_schema();
        let pg = synthesize_offline(&request("show patients", &schema, DatabaseKind::PostgreSql));
        assert_eq!(
            pg.sql,
            "SELECT id, first_name, last_name, date_of_birth, gender FROM patients LIMIT 10;"
        );
        let mssql = synthesize_offline(&request("show patients", &schema, DatabaseKind::SqlServer));
        assert_eq!(
            mssql.sql,
            "SELECT TOP 10 id, first_name, last_name, date_of_birth, gender FROM patients;"
        );
    }

    #[test]
    fn unknown_table_yields_placeholder_and_table_list() {
        let schema = patients_schema();
        let out = synthesize_offline(&request(
            "what's the weather like",
            &schema,
            DatabaseKind::PostgreSql,
        ));
        assert!(is_placeholder(&out.sql));
        assert!(out.text.contains("patients, appointments"));
    }

    #[test]
    fn underscored_table_names_match_with_spaces() {
        let schema = vec![TableSchema::new(
            "order_items",
            vec![("id", "INTEGER"), ("sku", "VARCHAR")],
        )];
        let out = synthesize_offline(&request(
            "list the order items",
            &schema,
            DatabaseKind::MySql,
        ));
        assert!(out.sql.contains("FROM order_items"));
    }

    #[tokio::test]
    async fn trait_object_path_works() {
        let schema = patients_schema();
        let synthesizer: Box<dyn Synthesizer> = Box::new(HeuristicSynthesizer);
        let out = synthesizer
            .synthesize(&SynthesisRequest {
                prompt: "how many appointments",
                schema: &schema,
                history: &NO_HISTORY,
                dialect: DatabaseKind::Sqlite,
            })
            .await
            .unwrap();
        assert_eq!(out.sql, "SELECT COUNT(*) AS total_count FROM appointments;");
    }

    proptest! {
        // Whatever the prompt, the output is a SELECT or the placeholder.
        #[test]
        fn never_emits_dml(prompt in ".{0,80}") {
            let schema = patients_schema();
            let out = synthesize_offline(&request(&prompt, &schema, DatabaseKind::PostgreSql));
            prop_assert!(out.sql.starts_with("SELECT ") || is_placeholder(&out.sql));
        }
    }
}
