//! Storage backends for persona state.

pub mod interface;
pub mod in_memory;
pub mod sqlite_storage;

pub use interface::{InteractionLog, MemoryStore, StateHandle, TraitStore};
pub use in_memory::InMemoryStore;
pub use sqlite_storage::{ColumnInfo, SqliteStore, TableSchema};
