//! Session management module
//!
//! Server-side session state and the stores that hold it.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteSessionStore;
pub use store::{InMemorySessionStore, SessionStore};
pub use types::SessionState;
