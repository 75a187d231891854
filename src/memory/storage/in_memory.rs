//! Process-local persona store.
//!
//! Keyed entities live in `DashMap`s, whose per-shard locks make each
//! upsert atomic. The interaction log is a vector behind a `RwLock`.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::interface::{validate_memory, validate_trait, InteractionLog, MemoryStore, TraitStore};
use crate::persona::{Interaction, MemoryRecord, NewInteraction, PersonaTrait, CURIOSITY, DEFAULT_CURIOSITY};
use crate::utilities::errors::StorageResult;

/// In-memory implementation of all three persona stores.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    traits: DashMap<String, PersonaTrait>,
    /// Records keyed by label, each with the sequence of its first insert.
    memories: DashMap<String, (u64, MemoryRecord)>,
    memory_seq: AtomicU64,
    interactions: RwLock<Vec<Interaction>>,
}

impl InMemoryStore {
    /// Empty store with no seeded traits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `curiosity = 5.0`, matching a fresh database.
    pub fn seeded() -> Self {
        let store = Self::new();
        store.traits.insert(
            CURIOSITY.to_string(),
            PersonaTrait {
                name: CURIOSITY.to_string(),
                value: DEFAULT_CURIOSITY,
                updated_at: Utc::now(),
            },
        );
        store
    }

    /// Upsert keeping the label's original sequence, like a SQLite rowid
    /// under `ON CONFLICT DO UPDATE`.
    fn upsert_memory(&self, label: &str, content: &str, created_at: DateTime<Utc>) {
        let record = MemoryRecord {
            label: label.to_string(),
            content: content.to_string(),
            created_at,
        };
        self.memories
            .entry(label.to_string())
            .and_modify(|(_, existing)| *existing = record.clone())
            .or_insert_with(|| (self.memory_seq.fetch_add(1, Ordering::Relaxed), record));
    }
}

impl TraitStore for InMemoryStore {
    fn get_trait(&self, name: &str) -> StorageResult<Option<PersonaTrait>> {
        Ok(self.traits.get(name).map(|t| t.value().clone()))
    }

    fn set_trait(&self, name: &str, value: f64) -> StorageResult<()> {
        validate_trait(name, value)?;
        self.traits.insert(
            name.to_string(),
            PersonaTrait {
                name: name.to_string(),
                value,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn list_traits(&self) -> StorageResult<Vec<PersonaTrait>> {
        let mut traits: Vec<PersonaTrait> =
            self.traits.iter().map(|t| t.value().clone()).collect();
        traits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(traits)
    }
}

impl MemoryStore for InMemoryStore {
    fn put_memory(&self, label: &str, content: &str) -> StorageResult<()> {
        validate_memory(label, content)?;
        self.upsert_memory(label, content, Utc::now());
        Ok(())
    }

    fn get_memory(&self, label: &str) -> StorageResult<Option<MemoryRecord>> {
        Ok(self.memories.get(label).map(|m| m.value().1.clone()))
    }

    fn list_recent_memories(&self, limit: usize) -> StorageResult<Vec<MemoryRecord>> {
        let mut memories: Vec<(u64, MemoryRecord)> =
            self.memories.iter().map(|m| m.value().clone()).collect();
        memories.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });
        Ok(memories
            .into_iter()
            .take(limit)
            .map(|(_, record)| record)
            .collect())
    }
}

impl InteractionLog for InMemoryStore {
    fn append_interaction(&self, interaction: &NewInteraction) -> StorageResult<i64> {
        let mut log = self.interactions.write();
        let id = log.last().map_or(1, |last| last.id + 1);
        log.push(Interaction {
            id,
            actor: interaction.actor.clone(),
            input: interaction.input.clone(),
            response: interaction.response.clone(),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    fn recent_interactions(&self, limit: usize) -> StorageResult<Vec<Interaction>> {
        let log = self.interactions.read();
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }
}
