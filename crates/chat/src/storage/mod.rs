//! Local persistence for client-side state
//!
//! Pins and last-read markers live in a small key-value store. The trait
//! allows swapping the in-memory store used in tests for SQLite.

mod last_read;
mod memory;
mod sqlite;
mod traits;

pub use last_read::{LAST_READ_PREFIX, LastRead, LastReadCache};
pub use memory::InMemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;
pub use traits::KeyValueStore;
