//! # Zoral
//!
//! A conversational NPC whose persona evolves as it talks: a bounded trait
//! vector, a labeled memory store, and a rolling conversation window feed
//! a text-generation backend, and a second reflection pass turns the
//! backend's free-text self-assessment back into state updates.

pub mod chat;
pub mod cli;
pub mod llms;
pub mod memory;
pub mod persona;
pub mod server;
pub mod utilities;

pub use chat::{ChatReply, ChatTurn, PersonaEngine};
pub use llms::TextGenerator;
pub use memory::{InMemoryStore, SqliteStore, StateHandle};
pub use utilities::errors::{BackendError, ParseAmbiguity, StorageError, ZoralError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
