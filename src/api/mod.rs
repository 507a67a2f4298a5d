//! Application-facing operations, one module per resource. These are the
//! functions a UI shell or HTTP layer binds to; they own persistence and
//! state-cache coordination and delegate the chat pipeline to the
//! orchestrator.

pub mod chat;
pub mod connection;
pub mod governance;
pub mod keys;
pub mod settings;
