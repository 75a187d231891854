//! Chat turn pipeline.
//!
//! ```text
//! utterance
//!   → context window (log or CLI buffer) + current curiosity
//!   → chat prompt     → backend → split prose/code → append to log → reply
//!   → reflection prompt → backend → parse directives → trait/memory writes
//! ```
//!
//! The two backend calls share one state snapshot and nothing else.

pub mod context_window;
pub mod engine;
pub mod prompts;
pub mod reflection;
pub mod response_splitter;

pub use context_window::{ContextWindowBuilder, TranscriptBuffer, TrimPolicy};
pub use engine::{ChatReply, ChatTurn, EngineSettings, PersonaEngine, ReflectionHandle, ReflectionOutcome};
pub use prompts::{ChatPrompt, PersonaSnapshot, PromptComposer, ReflectionPrompt};
pub use reflection::{parse_reflection, MemoryDirective, ReflectionDirectives, TraitUpdate};
pub use response_splitter::{split_response, SplitResponse};
