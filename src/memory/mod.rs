//! Persistent persona memory.
//!
//! Traits, labeled memories, and the interaction log all sit behind the
//! contracts in [`storage::interface`], with a SQLite backend for real
//! sessions and an in-process backend for tests and ephemeral runs.

pub mod storage;

pub use storage::{InMemoryStore, InteractionLog, MemoryStore, SqliteStore, StateHandle, TraitStore};
