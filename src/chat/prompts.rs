//! Prompt composition.
//!
//! Every turn sends two prompts to the backend and they must never be
//! merged: the chat prompt asks for in-persona prose, the reflection prompt
//! asks for a semi-structured self-assessment. Each has its own builder and
//! its own result type so one cannot be passed where the other is expected.

use serde::Serialize;

use crate::persona::{format_trait_value, DEFAULT_PERSONA_NAME};

/// State read once at the start of a turn and shared by both prompts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaSnapshot {
    /// Current curiosity value in `[0, 10]`.
    pub curiosity: f64,
    /// Context window lines, oldest first.
    pub transcript: Vec<String>,
}

/// Prompt for the user-facing reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt(String);

/// Prompt for the self-reflection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionPrompt(String);

impl ChatPrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ReflectionPrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Builds both prompts for a named persona.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    persona_name: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA_NAME)
    }
}

impl PromptComposer {
    pub fn new(persona_name: impl Into<String>) -> Self {
        Self {
            persona_name: persona_name.into(),
        }
    }

    pub fn persona_name(&self) -> &str {
        &self.persona_name
    }

    /// Framing line, transcript block, the new utterance, and a trailing
    /// `"{persona}:"` cue so the backend continues in persona.
    pub fn chat_prompt(
        &self,
        snapshot: &PersonaSnapshot,
        actor: &str,
        utterance: &str,
    ) -> ChatPrompt {
        ChatPrompt(format!(
            "You are {name}, an NPC with a curiosity level of {curiosity}/10. Past interactions:\n{transcript}\n{actor}: {utterance}\n{name}:",
            name = self.persona_name,
            curiosity = format_trait_value(snapshot.curiosity),
            transcript = snapshot.transcript.join("\n"),
            actor = actor,
            utterance = utterance,
        ))
    }

    /// Asks whether curiosity should change (and to what value in `[0, 10]`)
    /// and whether a memory should be formed (and with what label/content).
    pub fn reflection_prompt(&self, snapshot: &PersonaSnapshot, utterance: &str) -> ReflectionPrompt {
        ReflectionPrompt(format!(
            "{name} is an NPC with curiosity {curiosity}/10. User said: '{utterance}'. \
             Should {name}'s curiosity change? If so, suggest a new value (0-10). \
             Should {name} form a new memory? If so, suggest a label and content, \
             on one line, as 'Label: <label> Content: <content>'.",
            name = self.persona_name,
            curiosity = format_trait_value(snapshot.curiosity),
            utterance = utterance,
        ))
    }
}
