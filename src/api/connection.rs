//! Connection CRUD and test-connection.

use crate::db;
use crate::error::{Error, Result};
use crate::models::{
    ConnectionConfig, ConnectionRecord, ConnectionStatus, TestConnectionResult,
};
use crate::state::AppState;
use crate::store;

/// Save (insert or update) a connection. An update keeps the previously
/// cached schema snapshot; status resets to disconnected until the next test.
pub fn save_connection(state: &AppState, config: ConnectionConfig) -> Result<ConnectionRecord> {
    let db = state.metadata_db.lock().unwrap();
    let existing_schema = store::load_connections(&db, &state.cipher)?
        .into_iter()
        .find(|r| r.config.id == config.id)
        .map(|r| r.schema)
        .unwrap_or_default();

    let record = ConnectionRecord {
        config: config.clone(),
        status: ConnectionStatus::Disconnected,
        schema: existing_schema,
    };
    store::save_connection(&db, &state.cipher, &record)?;
    drop(db);

    state.set_config(config);
    Ok(scrub(record))
}

/// All saved connections, passwords stripped for the caller.
pub fn list_connections(state: &AppState) -> Result<Vec<ConnectionRecord>> {
    let db = state.metadata_db.lock().unwrap();
    let records = store::load_connections(&db, &state.cipher)?;
    drop(db);

    for record in &records {
        state.set_config(record.config.clone());
    }
    Ok(records.into_iter().map(scrub).collect())
}

/// Delete a saved connection, closing any live handle first.
pub async fn delete_connection(state: &AppState, connection_id: &str) -> Result<()> {
    state.registry.disconnect(connection_id).await?;
    let db = state.metadata_db.lock().unwrap();
    store::delete_connection(&db, connection_id)?;
    drop(db);
    state.remove_config(connection_id);
    Ok(())
}

/// Test a saved connection. On success the schema snapshot is refreshed and
/// the stored status becomes `connected`; on failure it becomes `error`.
/// This is the only place the snapshot is refreshed.
pub async fn test_connection(
    state: &AppState,
    connection_id: &str,
) -> Result<TestConnectionResult> {
    let config = state
        .get_config(connection_id)
        .ok_or_else(|| Error::Config(format!("unknown connection: {}", connection_id)))?;

    let result = db::test_connection(&config).await;

    if result.success {
        state.registry.connect(&config).await?;
        let schema = state.registry.schema(connection_id).await;
        state.registry.disconnect(connection_id).await?;
        let schema = schema?;

        let db = state.metadata_db.lock().unwrap();
        store::save_connection(
            &db,
            &state.cipher,
            &ConnectionRecord {
                config,
                status: ConnectionStatus::Connected,
                schema,
            },
        )?;
    } else {
        let db = state.metadata_db.lock().unwrap();
        store::update_connection_status(&db, connection_id, ConnectionStatus::Error)?;
    }

    Ok(result)
}

fn scrub(mut record: ConnectionRecord) -> ConnectionRecord {
    record.config.password = None;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseKind;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            id: "db_1".into(),
            name: "clinic".into(),
            kind: DatabaseKind::PostgreSql,
            host: Some("localhost".into()),
            port: Some(5432),
            database: Some("clinic".into()),
            username: Some("app".into()),
            password: Some("hunter2".into()),
            file_path: None,
            file_content: None,
        }
    }

    #[test]
    fn saved_connections_come_back_without_passwords() {
        let state = AppState::in_memory().unwrap();
        save_connection(&state, config()).unwrap();

        let listed = list_connections(&state).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].config.password.is_none());
        // the cache keeps the full config for connecting
        assert_eq!(
            state.get_config("db_1").unwrap().password.as_deref(),
            Some("hunter2")
        );
    }

    #[tokio::test]
    async fn delete_removes_row_and_cache_entry() {
        let state = AppState::in_memory().unwrap();
        save_connection(&state, config()).unwrap();
        delete_connection(&state, "db_1").await.unwrap();

        assert!(list_connections(&state).unwrap().is_empty());
        assert!(state.get_config("db_1").is_none());
    }

    #[tokio::test]
    async fn testing_an_unknown_connection_is_a_config_error() {
        let state = AppState::in_memory().unwrap();
        assert!(matches!(
            test_connection(&state, "db_404").await.err(),
            Some(Error::Config(_))
        ));
    }
}
