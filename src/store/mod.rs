//! Local metadata store: saved connections, governance rules, API keys and
//! app settings, persisted in a SQLite file under the app data directory.
//! Passwords and key material go through the credential cipher before they
//! touch disk.

pub mod credentials;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{
    ApiKey, AppSettings, ConnectionConfig, ConnectionRecord, ConnectionStatus, GovernanceRule,
    TableSchema,
};
use credentials::CredentialCipher;

/// Initialize the SQLite database and create tables if they don't exist.
pub fn init_database(app_data_dir: &Path) -> SqliteResult<Connection> {
    std::fs::create_dir_all(app_data_dir).ok();
    let db_path = app_data_dir.join("meridian.db");
    let conn = Connection::open(&db_path)?;
    create_tables(&conn)?;
    Ok(conn)
}

/// In-memory variant for tests.
pub fn init_database_in_memory() -> SqliteResult<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

fn create_tables(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r#"
        -- Saved database connections
        CREATE TABLE IF NOT EXISTS connections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            host TEXT,
            port INTEGER,
            database TEXT,
            username TEXT,
            password TEXT,
            file_path TEXT,
            file_content TEXT,
            status TEXT NOT NULL DEFAULT 'disconnected',
            schema_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        -- Governance rules
        CREATE TABLE IF NOT EXISTS governance_rules (
            id TEXT PRIMARY KEY,
            rule TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        );

        -- LLM provider API keys
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            masked_key TEXT NOT NULL,
            key TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_used TEXT,
            usage_count INTEGER NOT NULL DEFAULT 0
        );

        -- App settings (single row)
        CREATE TABLE IF NOT EXISTS app_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            settings_json TEXT NOT NULL,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
}

// ==================== Connections ====================

/// Save (insert or update) a connection. The password is encrypted before it
/// is written; the cached schema snapshot rides along as JSON.
pub fn save_connection(
    conn: &Connection,
    cipher: &CredentialCipher,
    record: &ConnectionRecord,
) -> Result<()> {
    let password_enc = match &record.config.password {
        Some(p) if !p.is_empty() => Some(cipher.encrypt(p)?),
        _ => None,
    };
    let schema_json =
        serde_json::to_string(&record.schema).unwrap_or_else(|_| "[]".to_string());

    conn.execute(
        r#"
        INSERT INTO connections
            (id, name, kind, host, port, database, username, password,
             file_path, file_content, status, schema_json, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            kind = excluded.kind,
            host = excluded.host,
            port = excluded.port,
            database = excluded.database,
            username = excluded.username,
            password = excluded.password,
            file_path = excluded.file_path,
            file_content = excluded.file_content,
            status = excluded.status,
            schema_json = excluded.schema_json,
            updated_at = CURRENT_TIMESTAMP
        "#,
        (
            &record.config.id,
            &record.config.name,
            record.config.kind.to_string(),
            &record.config.host,
            record.config.port,
            &record.config.database,
            &record.config.username,
            &password_enc,
            &record.config.file_path,
            &record.config.file_content,
            status_str(record.status),
            &schema_json,
        ),
    )?;
    Ok(())
}

/// Load all saved connections, decrypting passwords for active use.
pub fn load_connections(
    conn: &Connection,
    cipher: &CredentialCipher,
) -> Result<Vec<ConnectionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, host, port, database, username, password,
                file_path, file_content, status, schema_json
         FROM connections ORDER BY created_at",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<u16>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, Option<String>>(9)?,
            row.get::<_, String>(10)?,
            row.get::<_, String>(11)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, name, kind, host, port, database, username, password_enc, file_path,
            file_content, status, schema_json) = row?;

        let password = match password_enc {
            Some(ct) => Some(cipher.decrypt(&ct)?),
            None => None,
        };
        let schema: Vec<TableSchema> =
            serde_json::from_str(&schema_json).unwrap_or_default();

        records.push(ConnectionRecord {
            config: ConnectionConfig {
                id,
                name,
                kind: parse_kind(&kind)?,
                host,
                port,
                database,
                username,
                password,
                file_path,
                file_content,
            },
            status: parse_status(&status),
            schema,
        });
    }
    Ok(records)
}

/// Delete a saved connection.
pub fn delete_connection(conn: &Connection, connection_id: &str) -> Result<()> {
    conn.execute("DELETE FROM connections WHERE id = ?1", [connection_id])?;
    Ok(())
}

/// Persist a status change without touching the rest of the record.
pub fn update_connection_status(
    conn: &Connection,
    connection_id: &str,
    status: ConnectionStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE connections SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        (status_str(status), connection_id),
    )?;
    Ok(())
}

fn status_str(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Error => "error",
    }
}

fn parse_status(s: &str) -> ConnectionStatus {
    match s {
        "connected" => ConnectionStatus::Connected,
        "connecting" => ConnectionStatus::Connecting,
        "error" => ConnectionStatus::Error,
        _ => ConnectionStatus::Disconnected,
    }
}

fn parse_kind(s: &str) -> Result<crate::models::DatabaseKind> {
    use crate::models::DatabaseKind::*;
    match s {
        "PostgreSQL" => Ok(PostgreSql),
        "MySQL" => Ok(MySql),
        "SQLServer" => Ok(SqlServer),
        "SQLite" => Ok(Sqlite),
        other => Err(Error::Config(format!("unknown database kind: {}", other))),
    }
}

// ==================== Governance rules ====================

pub fn add_rule(conn: &Connection, rule: &GovernanceRule) -> Result<()> {
    conn.execute(
        "INSERT INTO governance_rules (id, rule, is_active) VALUES (?1, ?2, ?3)",
        (&rule.id, &rule.rule, rule.is_active),
    )?;
    Ok(())
}

/// All rules, first-added first. Evaluation order depends on this.
pub fn load_rules(conn: &Connection) -> Result<Vec<GovernanceRule>> {
    let mut stmt = conn
        .prepare("SELECT id, rule, is_active FROM governance_rules ORDER BY created_at, id")?;
    let rules = stmt.query_map([], |row| {
        Ok(GovernanceRule {
            id: row.get(0)?,
            rule: row.get(1)?,
            is_active: row.get(2)?,
        })
    })?;
    rules.collect::<SqliteResult<Vec<_>>>().map_err(Error::from)
}

pub fn set_rule_active(conn: &Connection, rule_id: &str, is_active: bool) -> Result<()> {
    conn.execute(
        "UPDATE governance_rules SET is_active = ?1 WHERE id = ?2",
        (is_active, rule_id),
    )?;
    Ok(())
}

pub fn delete_rule(conn: &Connection, rule_id: &str) -> Result<()> {
    conn.execute("DELETE FROM governance_rules WHERE id = ?1", [rule_id])?;
    Ok(())
}

// ==================== API keys ====================

pub fn add_api_key(conn: &Connection, cipher: &CredentialCipher, key: &ApiKey) -> Result<()> {
    let key_enc = cipher.encrypt(&key.key)?;
    conn.execute(
        r#"
        INSERT INTO api_keys (id, name, masked_key, key, is_active, created_at, last_used, usage_count)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        (
            &key.id,
            &key.name,
            &key.masked_key,
            &key_enc,
            key.is_active,
            key.created_at.to_rfc3339(),
            key.last_used.map(|t| t.to_rfc3339()),
            key.usage_count,
        ),
    )?;
    Ok(())
}

pub fn load_api_keys(conn: &Connection, cipher: &CredentialCipher) -> Result<Vec<ApiKey>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, masked_key, key, is_active, created_at, last_used, usage_count
         FROM api_keys ORDER BY created_at",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, bool>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, u64>(7)?,
        ))
    })?;

    let mut keys = Vec::new();
    for row in rows {
        let (id, name, masked_key, key_enc, is_active, created_at, last_used, usage_count) = row?;
        keys.push(ApiKey {
            id,
            name,
            masked_key,
            key: cipher.decrypt(&key_enc)?,
            is_active,
            created_at: parse_timestamp(&created_at),
            last_used: last_used.as_deref().map(parse_timestamp),
            usage_count,
        });
    }
    Ok(keys)
}

/// Activate one key, deactivating all others.
pub fn set_active_api_key(conn: &Connection, key_id: &str) -> Result<()> {
    conn.execute("UPDATE api_keys SET is_active = 0", [])?;
    conn.execute(
        "UPDATE api_keys SET is_active = 1 WHERE id = ?1",
        [key_id],
    )?;
    Ok(())
}

pub fn delete_api_key(conn: &Connection, key_id: &str) -> Result<()> {
    conn.execute("DELETE FROM api_keys WHERE id = ?1", [key_id])?;
    Ok(())
}

/// Record one synthesis call against the key.
pub fn record_api_key_usage(conn: &Connection, key_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE api_keys SET usage_count = usage_count + 1, last_used = ?1 WHERE id = ?2",
        (Utc::now().to_rfc3339(), key_id),
    )?;
    Ok(())
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ==================== App settings ====================

/// Load app settings, returning defaults if none were saved yet.
pub fn load_settings(conn: &Connection) -> Result<AppSettings> {
    let mut stmt = conn.prepare("SELECT settings_json FROM app_settings WHERE id = 1")?;
    let mut rows = stmt.query([])?;

    if let Some(row) = rows.next()? {
        let json: String = row.get(0)?;
        Ok(serde_json::from_str(&json).unwrap_or_default())
    } else {
        Ok(AppSettings::default())
    }
}

pub fn save_settings(conn: &Connection, settings: &AppSettings) -> Result<()> {
    let json = serde_json::to_string(settings).unwrap_or_else(|_| "{}".to_string());
    conn.execute(
        r#"
        INSERT INTO app_settings (id, settings_json, updated_at)
        VALUES (1, ?1, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            settings_json = excluded.settings_json,
            updated_at = CURRENT_TIMESTAMP
        "#,
        [&json],
    )?;
    Ok(())
}
