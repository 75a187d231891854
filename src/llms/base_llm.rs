//! Base text-generation contract.
//!
//! The persona engine only ever needs one operation from a model backend:
//! turn a prompt into text. Everything provider-specific (endpoints, model
//! ids, request bodies) lives behind [`TextGenerator`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::utilities::errors::BackendError;

/// Default request deadline for a single generation.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Monotonically increasing call counter for debugging.
static CALL_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Get the next call sequence number.
pub fn next_call_sequence() -> usize {
    CALL_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A backend that turns a prompt into free text.
///
/// Implementations must not retry internally: a failed call is reported
/// once and the caller decides whether it is surfaced or swallowed.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Run `generate` under a deadline, mapping expiry to [`BackendError::Timeout`].
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    prompt: &str,
    timeout: Duration,
) -> Result<String, BackendError> {
    match tokio::time::timeout(timeout, generator.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(timeout)),
    }
}
