pub mod api_key;
pub mod chat;
pub mod connection;
pub mod governance;
pub mod schema;
pub mod settings;

pub use api_key::*;
pub use chat::*;
pub use connection::*;
pub use governance::*;
pub use schema::*;
pub use settings::*;
