//! Storage contracts for persona state.
//!
//! Each store exposes blocking calls. A single upsert or append is the unit
//! of atomicity: concurrent writers to the same key may race, and the last
//! write wins, but no reader ever sees a partially written record.

use std::sync::Arc;

use crate::persona::{Interaction, MemoryRecord, NewInteraction, PersonaTrait};
use crate::utilities::errors::StorageResult;

/// Persistent mapping from trait name to a bounded value.
pub trait TraitStore: Send + Sync {
    /// Read a trait. `Ok(None)` when the name has never been written.
    fn get_trait(&self, name: &str) -> StorageResult<Option<PersonaTrait>>;

    /// Upsert a trait, stamped with the current time.
    ///
    /// The store does not clamp. Callers pass a value already in `[0, 10]`;
    /// anything else is rejected as an invalid record.
    fn set_trait(&self, name: &str, value: f64) -> StorageResult<()>;

    /// All traits, ordered by name.
    fn list_traits(&self) -> StorageResult<Vec<PersonaTrait>>;

    /// Read a trait value, falling back to its documented default.
    ///
    /// Returns `None` only for unknown traits that have no default.
    fn trait_value_or_default(&self, name: &str) -> StorageResult<Option<f64>> {
        Ok(self
            .get_trait(name)?
            .map(|t| t.value)
            .or_else(|| crate::persona::default_trait_value(name)))
    }
}

/// Persistent mapping from label to free-text content.
pub trait MemoryStore: Send + Sync {
    /// Upsert a memory. An existing label is overwritten, not merged.
    fn put_memory(&self, label: &str, content: &str) -> StorageResult<()>;

    /// Read one memory by label.
    fn get_memory(&self, label: &str) -> StorageResult<Option<MemoryRecord>>;

    /// The `limit` most recently written memories, newest first.
    fn list_recent_memories(&self, limit: usize) -> StorageResult<Vec<MemoryRecord>>;
}

/// Append-only record of exchanges.
pub trait InteractionLog: Send + Sync {
    /// Append one interaction and return its sequence id.
    fn append_interaction(&self, interaction: &NewInteraction) -> StorageResult<i64>;

    /// The `limit` most recent interactions, ordered oldest first.
    fn recent_interactions(&self, limit: usize) -> StorageResult<Vec<Interaction>>;
}

/// Explicit handle over the three persona stores.
///
/// Cloned into every component that reads or writes persona state, so two
/// engines can run over isolated stores in the same process.
#[derive(Clone)]
pub struct StateHandle {
    pub traits: Arc<dyn TraitStore>,
    pub memories: Arc<dyn MemoryStore>,
    pub interactions: Arc<dyn InteractionLog>,
}

impl StateHandle {
    pub fn new(
        traits: Arc<dyn TraitStore>,
        memories: Arc<dyn MemoryStore>,
        interactions: Arc<dyn InteractionLog>,
    ) -> Self {
        Self {
            traits,
            memories,
            interactions,
        }
    }

    /// Build a handle where one backend serves all three contracts.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: TraitStore + MemoryStore + InteractionLog + 'static,
    {
        Self {
            traits: backend.clone(),
            memories: backend.clone(),
            interactions: backend,
        }
    }
}

impl std::fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHandle").finish_non_exhaustive()
    }
}

/// Shared check for trait writes.
pub(crate) fn validate_trait(name: &str, value: f64) -> StorageResult<()> {
    use crate::persona::{TRAIT_MAX, TRAIT_MIN};
    use crate::utilities::errors::StorageError;

    if name.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            message: "trait name must not be empty".to_string(),
        });
    }
    if !(TRAIT_MIN..=TRAIT_MAX).contains(&value) {
        return Err(StorageError::InvalidRecord {
            message: format!(
                "trait '{}' value {} outside [{}, {}]",
                name, value, TRAIT_MIN, TRAIT_MAX
            ),
        });
    }
    Ok(())
}

/// Shared check for memory writes.
pub(crate) fn validate_memory(label: &str, content: &str) -> StorageResult<()> {
    use crate::utilities::errors::StorageError;

    if label.trim().is_empty() || content.trim().is_empty() {
        return Err(StorageError::InvalidRecord {
            message: "memory label and content must not be empty".to_string(),
        });
    }
    Ok(())
}
