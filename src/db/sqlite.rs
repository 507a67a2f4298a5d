//! SQLite connector for uploaded database files.
//!
//! The UI ships the database either as a base64-encoded blob or as a path on
//! disk. Uploaded content is materialized into a temp file that lives as long
//! as the handle, since the embedded engine wants a real file.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::types::ValueRef;
use rusqlite::Connection as SqliteConnection;
use std::io::Write;
use tempfile::NamedTempFile;

use super::Connector;
use crate::error::{Error, Result};
use crate::models::{ColumnSchema, ConnectionConfig, TableSchema, TabularResult};

pub struct SqliteConnector {
    conn: Option<SqliteConnection>,
    // Keeps an uploaded database file alive for the lifetime of the handle
    upload: Option<NamedTempFile>,
}

fn open_database(config: &ConnectionConfig) -> Result<(SqliteConnection, Option<NamedTempFile>)> {
    if let Some(content) = config.file_content.as_deref().filter(|c| !c.is_empty()) {
        let bytes = BASE64
            .decode(content)
            .map_err(|e| Error::Config(format!("invalid base64 database content: {}", e)))?;
        let mut file = NamedTempFile::new()
            .map_err(|e| Error::Config(format!("failed to create temp database file: {}", e)))?;
        file.write_all(&bytes)
            .map_err(|e| Error::Config(format!("failed to write temp database file: {}", e)))?;
        let conn = SqliteConnection::open(file.path())?;
        return Ok((conn, Some(file)));
    }

    if let Some(path) = config.file_path.as_deref().filter(|p| !p.is_empty()) {
        let conn = SqliteConnection::open(path)?;
        return Ok((conn, None));
    }

    Err(Error::Config(
        "SQLite connections require file content or a file path".to_string(),
    ))
}

/// The embedded engine has no server catalog to enumerate; report a single
/// synthetic name after verifying the file opens.
pub async fn list_databases(config: &ConnectionConfig) -> Result<Vec<String>> {
    let (conn, _upload) = open_database(config)?;
    conn.query_row("SELECT 1", [], |_| Ok(()))?;
    Ok(vec![config
        .file_path
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "database.db".to_string())])
}

impl SqliteConnector {
    pub fn new() -> Self {
        SqliteConnector {
            conn: None,
            upload: None,
        }
    }

    fn conn(&self) -> Result<&SqliteConnection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::NotConnected("sqlite handle not open".to_string()))
    }
}

impl Default for SqliteConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        let (conn, upload) = open_database(config)?;
        self.conn = Some(conn);
        self.upload = upload;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<TabularResult> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        // Headers come from the statement, so zero-row results still carry
        // their column names
        let headers: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(headers.len());
            for i in 0..headers.len() {
                record.push(extract_value(row.get_ref(i)?));
            }
            data.push(record);
        }

        Ok(TabularResult {
            headers,
            rows: data,
        })
    }

    async fn schema(&mut self) -> Result<Vec<TableSchema>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tables = Vec::new();
        for name in names {
            let pragma = format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\""));
            let mut stmt = conn.prepare(&pragma)?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnSchema {
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            tables.push(TableSchema {
                table_name: name,
                columns,
            });
        }
        Ok(tables)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.conn.take();
        self.upload.take();
        Ok(())
    }
}

fn extract_value(value: ValueRef<'_>) -> serde_json::Value {
    use serde_json::Value;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
    }
}
