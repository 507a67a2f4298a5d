//! Shared application state.

use rusqlite::Connection as SqliteConnection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::db::ConnectorRegistry;
use crate::error::Result;
use crate::models::ConnectionConfig;
use crate::orchestrator::ChatOrchestrator;
use crate::store::{self, credentials::CredentialCipher};

pub struct AppState {
    /// Local SQLite database holding connections, rules, keys and settings.
    pub metadata_db: Mutex<SqliteConnection>,

    /// At-rest cipher for passwords and API keys.
    pub cipher: CredentialCipher,

    /// Saved connection configurations, cached from the metadata store.
    pub connection_configs: Mutex<HashMap<String, ConnectionConfig>>,

    /// Live database handles, at most one per connection id.
    pub registry: Arc<ConnectorRegistry>,

    /// One conversation per connection id. Turns within a conversation are
    /// serialized by the orchestrator; different conversations run freely.
    pub conversations: Mutex<HashMap<String, Arc<ChatOrchestrator>>>,
}

impl AppState {
    pub fn new(metadata_db: SqliteConnection, cipher: CredentialCipher) -> Self {
        AppState {
            metadata_db: Mutex::new(metadata_db),
            cipher,
            connection_configs: Mutex::new(HashMap::new()),
            registry: Arc::new(ConnectorRegistry::new()),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Open the metadata store and cipher under the app data directory and
    /// prime the config cache.
    pub fn init(app_data_dir: &Path) -> Result<Self> {
        let metadata_db = store::init_database(app_data_dir)?;
        let cipher = CredentialCipher::load_or_create(app_data_dir)?;
        let state = AppState::new(metadata_db, cipher);
        {
            let db = state.metadata_db.lock().unwrap();
            let records = store::load_connections(&db, &state.cipher)?;
            let mut configs = state.connection_configs.lock().unwrap();
            for record in records {
                configs.insert(record.config.id.clone(), record.config);
            }
        }
        Ok(state)
    }

    /// Ephemeral state over an in-memory store, for tests.
    pub fn in_memory() -> Result<Self> {
        let metadata_db = store::init_database_in_memory()?;
        Ok(AppState::new(
            metadata_db,
            CredentialCipher::from_key([9u8; 32]),
        ))
    }

    pub fn get_config(&self, connection_id: &str) -> Option<ConnectionConfig> {
        let configs = self.connection_configs.lock().unwrap();
        configs.get(connection_id).cloned()
    }

    pub fn set_config(&self, config: ConnectionConfig) {
        let mut configs = self.connection_configs.lock().unwrap();
        configs.insert(config.id.clone(), config);
    }

    pub fn remove_config(&self, connection_id: &str) -> Option<ConnectionConfig> {
        let mut configs = self.connection_configs.lock().unwrap();
        configs.remove(connection_id)
    }

    /// Conversation for a connection, created on first use.
    pub fn conversation(&self, connection_id: &str) -> Arc<ChatOrchestrator> {
        let mut conversations = self.conversations.lock().unwrap();
        conversations
            .entry(connection_id.to_string())
            .or_insert_with(|| Arc::new(ChatOrchestrator::new(self.registry.clone())))
            .clone()
    }
}
