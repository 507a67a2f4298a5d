//! Database connectors.
//!
//! One trait, four dialect implementations, each owning its driver-native
//! handle. Every connector normalizes results into the uniform headers+rows
//! shape with column order preserved as the backend returned it. The
//! [`ConnectorRegistry`] enforces at most one live handle per connection id.

pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::models::{
    ConnectionConfig, DatabaseKind, TableSchema, TabularResult, TestConnectionResult,
};

/// Live handle to one backend database. Implementations hold driver-native
/// state (pool, TDS client, embedded connection) behind this seam; dialect
/// details never leak past it.
#[async_trait]
pub trait Connector: Send {
    /// Open the handle. Fails with `Authentication` on bad credentials,
    /// `Network` on unreachable host, `Config` on missing required fields.
    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()>;

    /// Run one statement and normalize the native result set.
    async fn execute(&mut self, sql: &str) -> Result<TabularResult>;

    /// Introspect the backend catalog into table schemas, columns in
    /// ordinal position order.
    async fn schema(&mut self) -> Result<Vec<TableSchema>>;

    /// Release the handle. Safe to call more than once.
    async fn disconnect(&mut self) -> Result<()>;
}

pub fn connector_for(kind: DatabaseKind) -> Box<dyn Connector> {
    match kind {
        DatabaseKind::PostgreSql => Box::new(postgres::PostgresConnector::new()),
        DatabaseKind::MySql => Box::new(mysql::MySqlConnector::new()),
        DatabaseKind::SqlServer => Box::new(mssql::SqlServerConnector::new()),
        DatabaseKind::Sqlite => Box::new(sqlite::SqliteConnector::new()),
    }
}

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate",
];

/// Defense-in-depth SELECT-only guard, applied at the execution boundary on
/// top of the synthesizer's own enforcement. Whole-word matching, so column
/// names like `create_date` pass.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let lowered = sql.to_lowercase();
    let mut tokens = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty());

    if tokens.next() != Some("select") {
        return Err(Error::UnsafeQueryRejected(
            "only SELECT statements are allowed".to_string(),
        ));
    }
    for token in tokens {
        if FORBIDDEN_KEYWORDS.contains(&token) {
            return Err(Error::UnsafeQueryRejected(format!(
                "statement contains forbidden keyword \"{}\"",
                token
            )));
        }
    }
    Ok(())
}

/// Test a configuration without registering a handle: connects, lists the
/// databases visible on the server, measures latency, and tears down.
/// Failures are folded into the result rather than returned as errors so
/// callers can persist the outcome uniformly.
pub async fn test_connection(config: &ConnectionConfig) -> TestConnectionResult {
    let start = Instant::now();
    let outcome = match config.kind {
        DatabaseKind::PostgreSql => postgres::list_databases(config).await,
        DatabaseKind::MySql => mysql::list_databases(config).await,
        DatabaseKind::SqlServer => mssql::list_databases(config).await,
        DatabaseKind::Sqlite => sqlite::list_databases(config).await,
    };

    match outcome {
        Ok(databases) => TestConnectionResult {
            success: true,
            databases,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => TestConnectionResult {
            success: false,
            databases: Vec::new(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

/// Tracks live connector handles, keyed by connection id.
///
/// The outer map lock is held only for lookups; each connector sits behind
/// its own async mutex, so a long-running query on one connection never
/// blocks another, while concurrent queries on the same connection queue.
pub struct ConnectorRegistry {
    handles: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Box<dyn Connector>>>>>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        ConnectorRegistry {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Open a handle for this config. A re-entrant connect on an id that
    /// already has a handle closes the old one first, so handles never leak.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        let previous = self.handles.lock().unwrap().remove(&config.id);
        if let Some(old) = previous {
            if let Err(e) = old.lock().await.disconnect().await {
                log::warn!("error closing replaced handle for {}: {}", config.id, e);
            }
        }

        let mut connector = connector_for(config.kind);
        connector.connect(config).await?;

        self.handles
            .lock()
            .unwrap()
            .insert(config.id.clone(), Arc::new(tokio::sync::Mutex::new(connector)));
        log::info!("connected: {} ({})", config.id, config.kind);
        Ok(())
    }

    fn handle(&self, connection_id: &str) -> Result<Arc<tokio::sync::Mutex<Box<dyn Connector>>>> {
        self.handles
            .lock()
            .unwrap()
            .get(connection_id)
            .cloned()
            .ok_or_else(|| Error::NotConnected(connection_id.to_string()))
    }

    /// Run a statement on an open handle. Fails with `NotConnected` when no
    /// handle exists and `UnsafeQueryRejected` when the statement is not a
    /// plain SELECT.
    pub async fn execute(&self, connection_id: &str, sql: &str) -> Result<TabularResult> {
        ensure_read_only(sql)?;
        let handle = self.handle(connection_id)?;
        let mut connector = handle.lock().await;
        connector.execute(sql).await
    }

    pub async fn schema(&self, connection_id: &str) -> Result<Vec<TableSchema>> {
        let handle = self.handle(connection_id)?;
        let mut connector = handle.lock().await;
        connector.schema().await
    }

    /// Close and drop a handle. Unknown ids are a no-op.
    pub async fn disconnect(&self, connection_id: &str) -> Result<()> {
        let handle = self.handles.lock().unwrap().remove(connection_id);
        if let Some(handle) = handle {
            handle.lock().await.disconnect().await?;
            log::info!("disconnected: {}", connection_id);
        }
        Ok(())
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.handles.lock().unwrap().contains_key(connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_accepts_plain_selects() {
        assert!(ensure_read_only("SELECT * FROM patients").is_ok());
        assert!(ensure_read_only("select count(*) from t where a = 1").is_ok());
    }

    #[test]
    fn guard_rejects_non_select_statements() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET a = 1",
            "DELETE FROM t",
            "DROP TABLE t",
            "TRUNCATE t",
            "",
            "-- comment only",
        ] {
            assert!(ensure_read_only(sql).is_err(), "should reject: {}", sql);
        }
    }

    #[test]
    fn guard_rejects_embedded_dml_keywords() {
        assert!(ensure_read_only("SELECT 1; DROP TABLE t").is_err());
        assert!(ensure_read_only("SELECT 1; DELETE FROM t").is_err());
    }

    #[test]
    fn guard_ignores_keyword_fragments_in_identifiers() {
        assert!(ensure_read_only("SELECT create_date, updated_by FROM audit_log").is_ok());
    }

    #[tokio::test]
    async fn execute_without_connect_is_not_connected() {
        let registry = ConnectorRegistry::new();
        let err = registry.execute("db_404", "SELECT 1").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(id) if id == "db_404"));
    }

    #[tokio::test]
    async fn disconnect_of_unknown_id_is_a_no_op() {
        let registry = ConnectorRegistry::new();
        assert!(registry.disconnect("db_404").await.is_ok());
        assert!(!registry.is_connected("db_404"));
    }
}
