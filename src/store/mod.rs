//! Durable content storage.
//!
//! [`SqliteContentStore`] implements the engine's
//! [`ContentStore`](hub_search::ContentStore) contract on a single SQLite
//! database file.

mod schema;
mod sqlite;

pub use sqlite::{SqliteContentStore, StoreError};
