//! API key management for the LLM-backed synthesizer.

use crate::error::Result;
use crate::models::ApiKey;
use crate::state::AppState;
use crate::store;

/// Store a new key. The caller gets back the masked form only.
pub fn add_api_key(state: &AppState, name: &str, key: &str) -> Result<ApiKey> {
    let api_key = ApiKey::new(name, key);
    let db = state.metadata_db.lock().unwrap();
    store::add_api_key(&db, &state.cipher, &api_key)?;
    Ok(scrub(api_key))
}

pub fn list_api_keys(state: &AppState) -> Result<Vec<ApiKey>> {
    let db = state.metadata_db.lock().unwrap();
    let keys = store::load_api_keys(&db, &state.cipher)?;
    Ok(keys.into_iter().map(scrub).collect())
}

/// Activate one key; any previously active key is deactivated.
pub fn activate_api_key(state: &AppState, key_id: &str) -> Result<()> {
    let db = state.metadata_db.lock().unwrap();
    store::set_active_api_key(&db, key_id)
}

pub fn delete_api_key(state: &AppState, key_id: &str) -> Result<()> {
    let db = state.metadata_db.lock().unwrap();
    store::delete_api_key(&db, key_id)
}

/// The active key with its cleartext material, for synthesis. `None` when no
/// key is active, which routes synthesis to the offline fallback.
pub fn active_api_key(state: &AppState) -> Result<Option<ApiKey>> {
    let db = state.metadata_db.lock().unwrap();
    let keys = store::load_api_keys(&db, &state.cipher)?;
    Ok(keys.into_iter().find(|k| k.is_active))
}

pub fn record_usage(state: &AppState, key_id: &str) -> Result<()> {
    let db = state.metadata_db.lock().unwrap();
    store::record_api_key_usage(&db, key_id)
}

fn scrub(mut key: ApiKey) -> ApiKey {
    key.key = String::new();
    key
}
