use serde::{Deserialize, Serialize};

use crate::models::TableSchema;

/// Supported database products. The tag doubles as the SQL dialect the
/// synthesizer targets (paging syntax, catalog queries).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatabaseKind {
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    #[serde(rename = "MySQL")]
    MySql,
    #[serde(rename = "SQLServer")]
    SqlServer,
    #[serde(rename = "SQLite")]
    Sqlite,
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseKind::PostgreSql => write!(f, "PostgreSQL"),
            DatabaseKind::MySql => write!(f, "MySQL"),
            DatabaseKind::SqlServer => write!(f, "SQLServer"),
            DatabaseKind::Sqlite => write!(f, "SQLite"),
        }
    }
}

impl DatabaseKind {
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseKind::PostgreSql => 5432,
            DatabaseKind::MySql => 3306,
            DatabaseKind::SqlServer => 1433,
            DatabaseKind::Sqlite => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Stored encrypted at rest; this field only carries the cleartext in
    /// transit between the UI and the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// SQLite only: display path of the uploaded file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// SQLite only: base64-encoded database file content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// A saved connection as surfaced to the UI: config metadata, last known
/// status and the cached schema snapshot (refreshed only on test/reconnect).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(flatten)]
    pub config: ConnectionConfig,
    pub status: ConnectionStatus,
    #[serde(default)]
    pub schema: Vec<TableSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionResult {
    pub success: bool,
    /// Database names visible on the server (a single synthetic name for
    /// SQLite).
    pub databases: Vec<String>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}
