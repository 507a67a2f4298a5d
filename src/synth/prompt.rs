//! Prompt assembly for the LLM-backed synthesis path.

use crate::models::{ChatMessage, DatabaseKind, Sender, TableSchema};

/// Render the schema the way the model is told to expect it:
/// `Table "patients" has columns: id (INTEGER), gender (VARCHAR)`.
pub fn serialize_schema(schema: &[TableSchema]) -> String {
    schema
        .iter()
        .map(|table| {
            let columns = table
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Table \"{}\" has columns: {}", table.table_name, columns)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render prior turns as plain role-prefixed lines. AI turns contribute their
/// explanation and the SQL they produced so follow-ups can refer back.
pub fn serialize_history(history: &[ChatMessage]) -> String {
    let mut lines = Vec::new();
    for message in history {
        let role = match message.sender {
            Sender::User => "user",
            Sender::Ai => "assistant",
        };
        if let Some(text) = &message.content.text {
            lines.push(format!("{}: {}", role, text));
        }
        if message.sender == Sender::Ai {
            if let Some(sql) = &message.content.sql {
                lines.push(format!("assistant (sql): {}", sql));
            }
        }
    }
    lines.join("\n")
}

pub fn build_system_prompt(
    schema: &[TableSchema],
    history: &[ChatMessage],
    dialect: DatabaseKind,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a SQL assistant embedded in a database chat application. \
         Translate the user's request into a single SQL query.\n\n",
    );
    prompt.push_str(&format!("Target dialect: {}\n\n", dialect));
    prompt.push_str("Database schema:\n");
    prompt.push_str(&serialize_schema(schema));
    prompt.push('\n');

    if !history.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(&serialize_history(history));
        prompt.push('\n');
    }

    prompt.push_str(
        "\nRules:\n\
         - Emit ONLY a JSON object, no markdown fences, no prose around it.\n\
         - The JSON object must list \"sql\" first, then \"text\", then the \
           optional chart fields \"chartType\", \"labelsColumn\", \"dataColumn\".\n\
         - \"sql\" must be a single SELECT statement valid for the target \
           dialect. Never emit INSERT, UPDATE, DELETE, DROP, ALTER, CREATE \
           or TRUNCATE.\n\
         - \"text\" is a short explanation of what the query returns.\n\
         - Suggest a chart only when the result is categorical labels with \
           numeric values: \"chartType\" is \"bar\" or \"pie\", and the two \
           column fields must name columns the query actually selects.\n\
         - If the request cannot be answered from the schema, set \"sql\" to \
           a comment starting with \"--\" and use \"text\" to ask for \
           clarification.\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Vec<TableSchema> {
        vec![TableSchema::new(
            "patients",
            vec![("id", "INTEGER"), ("gender", "VARCHAR")],
        )]
    }

    #[test]
    fn schema_serialization_matches_documented_shape() {
        assert_eq!(
            serialize_schema(&sample_schema()),
            "Table \"patients\" has columns: id (INTEGER), gender (VARCHAR)"
        );
    }

    #[test]
    fn system_prompt_names_dialect_and_forbids_dml() {
        let prompt = build_system_prompt(&sample_schema(), &[], DatabaseKind::MySql);
        assert!(prompt.contains("Target dialect: MySQL"));
        assert!(prompt.contains("Never emit INSERT"));
        assert!(prompt.contains("Table \"patients\""));
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn history_lines_carry_prior_sql() {
        let mut ai = ChatMessage::ai(Default::default());
        ai.content.text = Some("Counted the patients.".into());
        ai.content.sql = Some("SELECT COUNT(*) FROM patients;".into());
        let history = vec![ChatMessage::user("how many patients"), ai];

        let rendered = serialize_history(&history);
        assert!(rendered.contains("user: how many patients"));
        assert!(rendered.contains("assistant (sql): SELECT COUNT(*) FROM patients;"));
    }
}
