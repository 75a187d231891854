//! Text-generation provider implementations.
//!
//! Each provider implements [`TextGenerator`](crate::llms::base_llm::TextGenerator)
//! and owns its endpoint, request format, and error mapping.
//!
//! # Available Providers
//!
//! | Provider | Module |
//! |----------|--------|
//! | Ollama | [`ollama`] |

pub mod ollama;
