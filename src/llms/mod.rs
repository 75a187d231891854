//! Text-generation backends.
//!
//! [`base_llm::TextGenerator`] is the single seam between the persona engine
//! and a model server; [`providers`] holds the concrete clients.

pub mod base_llm;
pub mod providers;

pub use base_llm::{generate_with_timeout, TextGenerator};
