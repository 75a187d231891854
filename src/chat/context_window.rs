//! Rolling conversation window.
//!
//! Two ways to get the transcript fed into the chat prompt:
//!
//! - [`ContextWindowBuilder`] recomputes it each turn from the most recent
//!   interactions in the log.
//! - [`TranscriptBuffer`] is the long-lived in-process variant used by the
//!   interactive CLI, appended to after every exchange.
//!
//! Both apply a [`TrimPolicy`] so the prompt cannot grow without bound. The
//! cap counts lines, not tokens, and tail-truncation may cut an exchange in
//! half.

use crate::memory::storage::InteractionLog;
use crate::persona::{Interaction, DEFAULT_PERSONA_NAME};
use crate::utilities::errors::StorageResult;

/// Default number of interactions pulled from the log.
pub const DEFAULT_CONTEXT_TURNS: usize = 5;

/// Default line cap for the rolling transcript.
pub const DEFAULT_MAX_LINES: usize = 40;

/// Bound applied to a transcript after every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Keep only the most recent `n` lines.
    MaxLines(usize),
    /// Never trim.
    Unbounded,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        TrimPolicy::MaxLines(DEFAULT_MAX_LINES)
    }
}

impl TrimPolicy {
    /// Drop lines from the front until the policy holds.
    pub fn apply(&self, lines: &mut Vec<String>) {
        if let TrimPolicy::MaxLines(max) = *self {
            if lines.len() > max {
                lines.drain(..lines.len() - max);
            }
        }
    }
}

/// Render interactions as transcript lines, oldest first.
///
/// Each interaction contributes `"{actor}: {input}"` then
/// `"{persona}: {response}"`; a line is skipped when its field is empty.
pub fn render_interactions(interactions: &[Interaction], persona_name: &str) -> Vec<String> {
    let mut lines = Vec::with_capacity(interactions.len() * 2);
    for interaction in interactions {
        push_exchange(
            &mut lines,
            &interaction.actor,
            &interaction.input,
            persona_name,
            &interaction.response,
        );
    }
    lines
}

fn push_exchange(
    lines: &mut Vec<String>,
    actor: &str,
    input: &str,
    persona_name: &str,
    response: &str,
) {
    // multi-line fields count against the cap line by line
    if !input.is_empty() {
        push_split(lines, actor, input);
    }
    if !response.is_empty() {
        push_split(lines, persona_name, response);
    }
}

fn push_split(lines: &mut Vec<String>, speaker: &str, text: &str) {
    lines.extend(
        format!("{}: {}", speaker, text)
            .lines()
            .map(str::to_string),
    );
}

/// Builds the context window from the interaction log.
#[derive(Debug, Clone)]
pub struct ContextWindowBuilder {
    /// How many interactions to read.
    pub turns: usize,
    /// Name printed before persona replies.
    pub persona_name: String,
    /// Bound on the rendered transcript.
    pub policy: TrimPolicy,
}

impl Default for ContextWindowBuilder {
    fn default() -> Self {
        Self {
            turns: DEFAULT_CONTEXT_TURNS,
            persona_name: DEFAULT_PERSONA_NAME.to_string(),
            policy: TrimPolicy::default(),
        }
    }
}

impl ContextWindowBuilder {
    pub fn new(turns: usize, persona_name: impl Into<String>, policy: TrimPolicy) -> Self {
        Self {
            turns,
            persona_name: persona_name.into(),
            policy,
        }
    }

    /// Read the last `turns` interactions and render them.
    ///
    /// Pure with respect to the log: an unchanged log yields an identical
    /// transcript.
    pub fn build(&self, log: &dyn InteractionLog) -> StorageResult<Vec<String>> {
        let interactions = log.recent_interactions(self.turns)?;
        Ok(self.build_from(&interactions))
    }

    /// Render an already-loaded slice of interactions.
    pub fn build_from(&self, interactions: &[Interaction]) -> Vec<String> {
        let mut lines = render_interactions(interactions, &self.persona_name);
        self.policy.apply(&mut lines);
        lines
    }
}

/// Long-lived transcript that trims itself on every append.
#[derive(Debug, Clone)]
pub struct TranscriptBuffer {
    lines: Vec<String>,
    persona_name: String,
    policy: TrimPolicy,
}

impl TranscriptBuffer {
    pub fn new(persona_name: impl Into<String>, policy: TrimPolicy) -> Self {
        Self {
            lines: Vec::new(),
            persona_name: persona_name.into(),
            policy,
        }
    }

    /// Start from lines already rendered (usually from the log).
    pub fn with_lines(
        persona_name: impl Into<String>,
        policy: TrimPolicy,
        lines: Vec<String>,
    ) -> Self {
        let mut buffer = Self::new(persona_name, policy);
        buffer.extend(lines);
        buffer
    }

    /// Append raw lines and re-apply the policy.
    pub fn extend(&mut self, lines: impl IntoIterator<Item = String>) {
        self.lines.extend(lines);
        self.policy.apply(&mut self.lines);
    }

    /// Record one exchange and re-apply the policy.
    pub fn push_exchange(&mut self, actor: &str, input: &str, response: &str) {
        push_exchange(&mut self.lines, actor, input, &self.persona_name, response);
        self.policy.apply(&mut self.lines);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The transcript as a single newline-joined block.
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::InMemoryStore;
    use crate::persona::NewInteraction;

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {}", i)).collect()
    }

    #[test]
    fn test_trim_keeps_last_forty_of_fifty() {
        let mut lines = numbered(50);
        TrimPolicy::MaxLines(40).apply(&mut lines);
        assert_eq!(lines.len(), 40);
        assert_eq!(lines.first().unwrap(), "line 10");
        assert_eq!(lines.last().unwrap(), "line 49");
    }

    #[test]
    fn test_trim_noop_under_cap_and_unbounded() {
        let mut lines = numbered(12);
        TrimPolicy::MaxLines(40).apply(&mut lines);
        assert_eq!(lines.len(), 12);

        let mut lines = numbered(500);
        TrimPolicy::Unbounded.apply(&mut lines);
        assert_eq!(lines.len(), 500);
    }

    #[test]
    fn test_buffer_trims_on_every_append() {
        let mut buffer = TranscriptBuffer::new("Zoral", TrimPolicy::MaxLines(40));
        for i in 0..25 {
            buffer.push_exchange("bob", &format!("q{}", i), &format!("a{}", i));
            assert!(buffer.len() <= 40);
        }
        assert_eq!(buffer.len(), 40);
        assert_eq!(buffer.lines()[0], "bob: q5");
        assert_eq!(buffer.lines()[39], "Zoral: a24");
    }

    #[test]
    fn test_buffer_with_fifty_seed_lines_keeps_last_forty() {
        let buffer = TranscriptBuffer::with_lines("Zoral", TrimPolicy::default(), numbered(50));
        assert_eq!(buffer.lines(), &numbered(50)[10..]);
    }

    #[test]
    fn test_render_skips_empty_fields() {
        let store = InMemoryStore::new();
        store
            .append_interaction(&NewInteraction::new("bob", "hello", ""))
            .unwrap();
        store
            .append_interaction(&NewInteraction::new("bob", "", "greetings"))
            .unwrap();

        let lines = ContextWindowBuilder::default().build(&store).unwrap();
        assert_eq!(lines, vec!["bob: hello", "Zoral: greetings"]);
    }

    #[test]
    fn test_builder_reads_last_n_oldest_first() {
        let store = InMemoryStore::new();
        for i in 0..8 {
            store
                .append_interaction(&NewInteraction::new("amy", format!("q{}", i), format!("a{}", i)))
                .unwrap();
        }
        let lines = ContextWindowBuilder::default().build(&store).unwrap();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "amy: q3");
        assert_eq!(lines[1], "Zoral: a3");
        assert_eq!(lines[9], "Zoral: a7");
    }

    #[test]
    fn test_builder_is_idempotent() {
        let store = InMemoryStore::new();
        store
            .append_interaction(&NewInteraction::new("amy", "hi", "hello amy"))
            .unwrap();
        let builder = ContextWindowBuilder::default();
        let first = builder.build(&store).unwrap();
        let second = builder.build(&store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multiline_input_respects_cap() {
        let input: Vec<String> = (0..60).map(|i| format!("row {}", i)).collect();
        let input = input.join("\n");

        let mut buffer = TranscriptBuffer::new("Zoral", TrimPolicy::MaxLines(40));
        buffer.push_exchange("bob", &input, "ok");
        assert_eq!(buffer.len(), 40);
        assert_eq!(buffer.render().lines().count(), 40);
        assert_eq!(buffer.lines()[39], "Zoral: ok");

        let store = InMemoryStore::new();
        store
            .append_interaction(&NewInteraction::new("bob", input.as_str(), "ok"))
            .unwrap();
        let lines = ContextWindowBuilder::default().build(&store).unwrap();
        assert_eq!(lines.len(), 40);
        assert!(lines.iter().all(|l| !l.contains('\n')));
        assert_eq!(lines[0], "row 21");
    }

    #[test]
    fn test_multiline_response_counts_each_line() {
        let mut buffer = TranscriptBuffer::new("Zoral", TrimPolicy::MaxLines(3));
        buffer.push_exchange("bob", "code?", "Sure.\n```\nx\n```");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.render(), "```\nx\n```");
    }
}
