//! Core backend library for the Meridian data chat client: natural-language
//! questions in, governed SELECT-only SQL out, executed against PostgreSQL,
//! MySQL, SQL Server or uploaded SQLite files.

pub mod api;
pub mod db;
pub mod error;
pub mod governance;
pub mod models;
pub mod orchestrator;
pub mod state;
pub mod store;
pub mod synth;

pub use error::{Error, Result};
