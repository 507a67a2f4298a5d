//! App settings load/save.

use crate::error::Result;
use crate::models::AppSettings;
use crate::state::AppState;
use crate::store;

pub fn get_settings(state: &AppState) -> Result<AppSettings> {
    let db = state.metadata_db.lock().unwrap();
    store::load_settings(&db)
}

pub fn update_settings(state: &AppState, settings: &AppSettings) -> Result<()> {
    let db = state.metadata_db.lock().unwrap();
    store::save_settings(&db, settings)
}
