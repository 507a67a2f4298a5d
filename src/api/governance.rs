//! Governance rule CRUD.

use crate::error::Result;
use crate::models::GovernanceRule;
use crate::state::AppState;
use crate::store;

pub fn add_rule(state: &AppState, rule_text: &str) -> Result<GovernanceRule> {
    let rule = GovernanceRule::new(rule_text);
    let db = state.metadata_db.lock().unwrap();
    store::add_rule(&db, &rule)?;
    Ok(rule)
}

/// All rules in first-added order, which is also evaluation order.
pub fn list_rules(state: &AppState) -> Result<Vec<GovernanceRule>> {
    let db = state.metadata_db.lock().unwrap();
    store::load_rules(&db)
}

pub fn set_rule_active(state: &AppState, rule_id: &str, is_active: bool) -> Result<()> {
    let db = state.metadata_db.lock().unwrap();
    store::set_rule_active(&db, rule_id, is_active)
}

pub fn delete_rule(state: &AppState, rule_id: &str) -> Result<()> {
    let db = state.metadata_db.lock().unwrap();
    store::delete_rule(&db, rule_id)
}
