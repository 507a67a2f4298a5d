use serde::{Deserialize, Serialize};

/// One column of an introspected table, in ordinal position order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Immutable snapshot of a table's shape, cached on the connection record.
/// Becomes stale if the backend schema changes; re-fetched only on an
/// explicit test/reconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<(&str, &str)>) -> Self {
        TableSchema {
            table_name: table_name.into(),
            columns: columns
                .into_iter()
                .map(|(name, data_type)| ColumnSchema {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                })
                .collect(),
        }
    }
}
