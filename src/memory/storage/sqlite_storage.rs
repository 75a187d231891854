//! SQLite-backed persona store.
//!
//! One connection guarded by a mutex serializes every statement, which makes
//! each upsert and append atomic with respect to other writers in the
//! process.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::interface::{validate_memory, validate_trait, InteractionLog, MemoryStore, TraitStore};
use crate::persona::{
    Interaction, MemoryRecord, NewInteraction, PersonaTrait, CURIOSITY, DEFAULT_CURIOSITY,
};
use crate::utilities::errors::{StorageError, StorageResult};

/// Tables owned by this store, in creation order.
pub const TABLES: [&str; 3] = ["persona_traits", "persona_memories", "persona_interactions"];

/// Column description returned by [`SqliteStore::describe_schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Table description returned by [`SqliteStore::describe_schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// SQLite storage for traits, memories, and the interaction log.
pub struct SqliteStore {
    /// Path to the database file.
    pub db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and initialize the schema.
    ///
    /// Initialization is idempotent: tables are created if missing and
    /// `curiosity` is seeded only when it has no row yet.
    pub fn open(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| {
            log::error!(
                "STORAGE ERROR: could not open database {}: {}",
                db_path.display(),
                e
            );
            StorageError::from(e)
        })?;

        let store = Self {
            db_path,
            conn: Mutex::new(conn),
        };
        store.initialize_db()?;
        Ok(store)
    }

    /// Open an in-memory database. Used by tests and throwaway sessions.
    pub fn open_in_memory() -> StorageResult<Self> {
        let store = Self {
            db_path: PathBuf::from(":memory:"),
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize_db()?;
        Ok(store)
    }

    fn initialize_db(&self) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS persona_traits (
                name TEXT PRIMARY KEY,
                value REAL NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS persona_memories (
                label TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS persona_interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor TEXT,
                input TEXT,
                response TEXT,
                timestamp TEXT
            );",
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO persona_traits (name, value, updated_at)
             VALUES (?1, ?2, ?3)",
            params![CURIOSITY, DEFAULT_CURIOSITY, now_timestamp()],
        )?;
        Ok(())
    }

    /// List the store's tables with their columns.
    pub fn describe_schema(&self) -> StorageResult<Vec<TableSchema>> {
        let conn = self.conn.lock();
        let mut tables = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            // table names come from a fixed list, never from input
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        declared_type: row.get(2)?,
                        not_null: row.get::<_, i64>(3)? != 0,
                        primary_key: row.get::<_, i64>(5)? != 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            tables.push(TableSchema {
                name: table.to_string(),
                columns,
            });
        }
        Ok(tables)
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(column: &str, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptValue {
            column: column.to_string(),
            message: format!("{:?}: {}", raw, e),
        })
}

impl TraitStore for SqliteStore {
    fn get_trait(&self, name: &str) -> StorageResult<Option<PersonaTrait>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT name, value, updated_at FROM persona_traits WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        row.map(|(name, value, updated_at)| {
            Ok(PersonaTrait {
                name,
                value,
                updated_at: parse_timestamp("persona_traits.updated_at", &updated_at)?,
            })
        })
        .transpose()
    }

    fn set_trait(&self, name: &str, value: f64) -> StorageResult<()> {
        validate_trait(name, value)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO persona_traits (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![name, value, now_timestamp()],
        )
        .map_err(|e| {
            log::error!("STORAGE ERROR: failed to set trait {}: {}", name, e);
            StorageError::from(e)
        })?;
        Ok(())
    }

    fn list_traits(&self) -> StorageResult<Vec<PersonaTrait>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT name, value, updated_at FROM persona_traits ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, value, updated_at)| {
                Ok(PersonaTrait {
                    name,
                    value,
                    updated_at: parse_timestamp("persona_traits.updated_at", &updated_at)?,
                })
            })
            .collect()
    }
}

impl MemoryStore for SqliteStore {
    fn put_memory(&self, label: &str, content: &str) -> StorageResult<()> {
        validate_memory(label, content)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO persona_memories (label, content, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(label) DO UPDATE SET content = excluded.content, created_at = excluded.created_at",
            params![label, content, now_timestamp()],
        )
        .map_err(|e| {
            log::error!("STORAGE ERROR: failed to add memory {}: {}", label, e);
            StorageError::from(e)
        })?;
        Ok(())
    }

    fn get_memory(&self, label: &str) -> StorageResult<Option<MemoryRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT label, content, created_at FROM persona_memories WHERE label = ?1",
                params![label],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        row.map(|(label, content, created_at)| {
            Ok(MemoryRecord {
                label,
                content,
                created_at: parse_timestamp("persona_memories.created_at", &created_at)?,
            })
        })
        .transpose()
    }

    fn list_recent_memories(&self, limit: usize) -> StorageResult<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        // rowid breaks ties between writes stamped in the same instant
        let mut stmt = conn.prepare(
            "SELECT label, content, created_at FROM persona_memories
             ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(label, content, created_at)| {
                Ok(MemoryRecord {
                    label,
                    content,
                    created_at: parse_timestamp("persona_memories.created_at", &created_at)?,
                })
            })
            .collect()
    }
}

impl InteractionLog for SqliteStore {
    fn append_interaction(&self, interaction: &NewInteraction) -> StorageResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO persona_interactions (actor, input, response, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                interaction.actor,
                interaction.input,
                interaction.response,
                now_timestamp()
            ],
        )
        .map_err(|e| {
            log::error!("STORAGE ERROR: failed to save interaction: {}", e);
            StorageError::from(e)
        })?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_interactions(&self, limit: usize) -> StorageResult<Vec<Interaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, actor, input, response, timestamp FROM persona_interactions
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let mut interactions = rows
            .into_iter()
            .map(|(id, actor, input, response, timestamp)| {
                let timestamp = match timestamp {
                    Some(raw) => parse_timestamp("persona_interactions.timestamp", &raw)?,
                    None => DateTime::<Utc>::default(),
                };
                Ok(Interaction {
                    id,
                    actor: actor.unwrap_or_default(),
                    input: input.unwrap_or_default(),
                    response: response.unwrap_or_default(),
                    timestamp,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;
        interactions.reverse();
        Ok(interactions)
    }
}
