//! Error types for the persona engine.
//!
//! Three failure classes cross component boundaries: the generation
//! backend failed, a reflection reply could not be decoded, or the store
//! rejected a read/write. [`ZoralError`] wraps all three for callers that
//! do not need to branch on the class.

use std::time::Duration;

use thiserror::Error;

/// The text-generation backend failed or timed out.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced an HTTP response.
    #[error("backend transport error: {message}")]
    Transport { message: String },

    /// The call did not finish within its deadline.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be decoded into a generation result.
    #[error("malformed backend response: {message}")]
    MalformedResponse { message: String },
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured deadline
            BackendError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            BackendError::MalformedResponse {
                message: err.to_string(),
            }
        } else {
            BackendError::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// A reflection reply triggered a keyword but held nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAmbiguity {
    /// The trait keyword appeared with no number after it.
    #[error("reply mentions '{trait_name}' but proposes no numeric value")]
    MissingTraitValue { trait_name: String },

    /// The memory keyword appeared but no line carried both markers.
    #[error("reply mentions a memory but has no 'label: .. content: ..' line")]
    NoMemoryRecord,

    /// A marker line had an empty label or empty content.
    #[error("memory line has an empty label or content: {line:?}")]
    EmptyMemoryField { line: String },
}

/// A persistent read or write failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The record violates a store contract (empty key, out-of-range value).
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },

    /// A stored value could not be decoded back into its type.
    #[error("corrupt stored value in {column}: {message}")]
    CorruptValue { column: String, message: String },

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum ZoralError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Parse(#[from] ParseAmbiguity),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Result alias used by the storage layer.
pub type StorageResult<T> = Result<T, StorageError>;
