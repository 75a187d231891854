//! State-update parser for reflection replies.
//!
//! The reflection reply is free text from the model, read as a loose
//! directive channel. Parsing never fails: every fact is optional, and a
//! keyword with nothing usable behind it is recorded as a
//! [`ParseAmbiguity`] instead of an error. Applying the parsed directives
//! is a separate step so the parse itself can be tested without a store.
//!
//! Recognized directives:
//!
//! - **Trait change**: the reply mentions `curiosity` (any case). The first
//!   number after that mention is the proposed value, clamped to `[0, 10]`.
//! - **Memory**: the reply mentions `memory` (any case). Every line holding
//!   both `label:` and `content:` (any case) yields one memory; the label is
//!   the text between the markers and the content is the text after
//!   `content:`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::memory::storage::StateHandle;
use crate::persona::{clamp_trait_value, CURIOSITY};
use crate::utilities::errors::ParseAmbiguity;

static CURIOSITY_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)curiosity").expect("Invalid regex"));
static MEMORY_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)memory").expect("Invalid regex"));
static LABEL_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)label:").expect("Invalid regex"));
static CONTENT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)content:").expect("Invalid regex"));
// ASCII digits only: `\d` would also accept digits `f64::from_str` rejects
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?[0-9]+(?:\.[0-9]+)?").expect("Invalid regex"));

/// A proposed trait change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitUpdate {
    pub name: String,
    /// The number as it appeared in the reply.
    pub proposed: f64,
    /// `proposed` clamped into `[0, 10]`; this is what gets written.
    pub value: f64,
}

/// A memory the reply asked to form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryDirective {
    pub label: String,
    pub content: String,
}

/// Everything decoded from one reflection reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReflectionDirectives {
    pub trait_update: Option<TraitUpdate>,
    pub memories: Vec<MemoryDirective>,
    /// Keywords that fired without a usable payload.
    #[serde(skip)]
    pub ambiguities: Vec<ParseAmbiguity>,
}

impl ReflectionDirectives {
    /// True when applying would not touch any store.
    pub fn is_empty(&self) -> bool {
        self.trait_update.is_none() && self.memories.is_empty()
    }
}

/// What happened when directives were applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppliedReflection {
    /// Trait value written, if the write succeeded.
    pub trait_written: Option<f64>,
    /// Labels written successfully, in reply order.
    pub memories_written: Vec<String>,
    /// Store failures, already logged.
    pub failures: Vec<String>,
}

/// Decode a reflection reply. Never panics and never errors.
pub fn parse_reflection(reply: &str) -> ReflectionDirectives {
    let mut directives = ReflectionDirectives::default();

    match extract_trait_update(reply, CURIOSITY) {
        Ok(update) => directives.trait_update = update,
        Err(ambiguity) => directives.ambiguities.push(ambiguity),
    }

    if MEMORY_KEYWORD.is_match(reply) {
        let (memories, mut ambiguities) = extract_memory_directives(reply);
        if memories.is_empty() && ambiguities.is_empty() {
            ambiguities.push(ParseAmbiguity::NoMemoryRecord);
        }
        directives.memories = memories;
        directives.ambiguities.append(&mut ambiguities);
    }

    directives
}

/// Find a proposed value for the trait keyword.
///
/// `Ok(None)` when the keyword is absent, `Err` when it is present but no
/// number follows its first occurrence.
pub fn extract_trait_update(
    reply: &str,
    trait_name: &str,
) -> Result<Option<TraitUpdate>, ParseAmbiguity> {
    let keyword = if trait_name == CURIOSITY {
        CURIOSITY_KEYWORD.find(reply)
    } else {
        find_case_insensitive(reply, trait_name)
    };
    let Some(keyword) = keyword else {
        return Ok(None);
    };

    let missing = || ParseAmbiguity::MissingTraitValue {
        trait_name: trait_name.to_string(),
    };

    let tail = &reply[keyword.end()..];
    let number = NUMBER.find(tail).ok_or_else(missing)?;
    let proposed: f64 = number.as_str().parse().map_err(|_| missing())?;
    let value = clamp_trait_value(proposed).ok_or_else(missing)?;

    Ok(Some(TraitUpdate {
        name: trait_name.to_string(),
        proposed,
        value,
    }))
}

/// Collect `label: .. content: ..` lines.
///
/// Lines without both markers are skipped silently. Lines where either
/// field trims to nothing are skipped and reported.
pub fn extract_memory_directives(reply: &str) -> (Vec<MemoryDirective>, Vec<ParseAmbiguity>) {
    let mut memories = Vec::new();
    let mut ambiguities = Vec::new();

    for line in reply.split('\n') {
        let Some(label_marker) = LABEL_MARKER.find(line) else {
            continue;
        };
        let after_label = &line[label_marker.end()..];
        let Some(content_marker) = CONTENT_MARKER.find(after_label) else {
            continue;
        };

        let label = after_label[..content_marker.start()].trim();
        let content = after_label[content_marker.end()..].trim();

        if label.is_empty() || content.is_empty() {
            ambiguities.push(ParseAmbiguity::EmptyMemoryField {
                line: line.trim().to_string(),
            });
            continue;
        }

        memories.push(MemoryDirective {
            label: label.to_string(),
            content: content.to_string(),
        });
    }

    (memories, ambiguities)
}

/// Write parsed directives to the stores.
///
/// Each write is attempted independently; a failure is logged and recorded
/// and does not stop the remaining writes.
pub fn apply_directives(directives: &ReflectionDirectives, state: &StateHandle) -> AppliedReflection {
    let mut applied = AppliedReflection::default();

    if let Some(update) = &directives.trait_update {
        match state.traits.set_trait(&update.name, update.value) {
            Ok(()) => {
                tracing::info!(
                    name = %update.name,
                    proposed = update.proposed,
                    value = update.value,
                    "trait updated from reflection"
                );
                applied.trait_written = Some(update.value);
            }
            Err(e) => {
                tracing::error!(name = %update.name, error = %e, "failed to write trait");
                applied.failures.push(e.to_string());
            }
        }
    }

    for memory in &directives.memories {
        match state.memories.put_memory(&memory.label, &memory.content) {
            Ok(()) => {
                tracing::info!(label = %memory.label, "memory formed from reflection");
                applied.memories_written.push(memory.label.clone());
            }
            Err(e) => {
                tracing::error!(label = %memory.label, error = %e, "failed to write memory");
                applied.failures.push(e.to_string());
            }
        }
    }

    applied
}

/// ASCII case-insensitive substring search returning the match span.
fn find_case_insensitive<'a>(haystack: &'a str, needle: &str) -> Option<regex::Match<'a>> {
    Regex::new(&format!("(?i){}", regex::escape(needle)))
        .ok()?
        .find(haystack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::{InMemoryStore, MemoryStore, TraitStore};
    use std::sync::Arc;

    #[test]
    fn test_extracts_decimal_value() {
        let directives = parse_reflection("I think curiosity should rise to 7.5 because of the dragon.");
        let update = directives.trait_update.unwrap();
        assert_eq!(update.name, "curiosity");
        assert_eq!(update.value, 7.5);
        assert!(directives.ambiguities.is_empty());
    }

    #[test]
    fn test_clamps_out_of_range_values() {
        let high = parse_reflection("Curiosity: 15").trait_update.unwrap();
        assert_eq!(high.proposed, 15.0);
        assert_eq!(high.value, 10.0);

        let low = parse_reflection("curiosity drops to -2 now").trait_update.unwrap();
        assert_eq!(low.proposed, -2.0);
        assert_eq!(low.value, 0.0);
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        let update = parse_reflection("CURIOSITY -> 3").trait_update.unwrap();
        assert_eq!(update.value, 3.0);
    }

    #[test]
    fn test_number_before_keyword_is_ignored() {
        let directives = parse_reflection("On a scale of 10, curiosity stays where it is.");
        assert!(directives.trait_update.is_none());
        assert_eq!(
            directives.ambiguities,
            vec![ParseAmbiguity::MissingTraitValue {
                trait_name: "curiosity".to_string()
            }]
        );
    }

    #[test]
    fn test_keyword_without_number_never_panics() {
        let replies = [
            "curiosity",
            "Curiosity should not change.",
            "curiosity: unchanged. memory: none",
            "   curiosity -",
            "curiosity ٣",
        ];
        for reply in replies {
            let directives = parse_reflection(reply);
            assert!(directives.trait_update.is_none(), "reply: {:?}", reply);
        }
    }

    #[test]
    fn test_no_keywords_yields_nothing() {
        let directives = parse_reflection("Zoral nods thoughtfully. 42.");
        assert!(directives.is_empty());
        assert!(directives.ambiguities.is_empty());
    }

    #[test]
    fn test_memory_line_markers_case_insensitive() {
        let reply = "Yes, form a memory.\nLabel: Met Alice Content: She is friendly\nThat's all.";
        let directives = parse_reflection(reply);
        assert_eq!(
            directives.memories,
            vec![MemoryDirective {
                label: "Met Alice".to_string(),
                content: "She is friendly".to_string(),
            }]
        );
    }

    #[test]
    fn test_multiple_memory_lines() {
        let reply = "New memory:\nlabel: tavern content: The user owns a tavern\n\
                     noise line\nLABEL: dog CONTENT: Has a dog named Rex ";
        let directives = parse_reflection(reply);
        assert_eq!(directives.memories.len(), 2);
        assert_eq!(directives.memories[1].label, "dog");
        assert_eq!(directives.memories[1].content, "Has a dog named Rex");
    }

    #[test]
    fn test_memory_lines_ignored_without_keyword() {
        let directives = parse_reflection("Label: x Content: y");
        assert!(directives.memories.is_empty());
    }

    #[test]
    fn test_memory_keyword_without_lines_is_ambiguous() {
        let directives = parse_reflection("No new memory is needed.");
        assert!(directives.memories.is_empty());
        assert_eq!(directives.ambiguities, vec![ParseAmbiguity::NoMemoryRecord]);
    }

    #[test]
    fn test_empty_fields_are_skipped_and_reported() {
        let reply = "memory:\nLabel: Content: orphan content\nLabel: ok Content: fine";
        let directives = parse_reflection(reply);
        assert_eq!(directives.memories.len(), 1);
        assert_eq!(directives.memories[0].label, "ok");
        assert!(matches!(
            directives.ambiguities[0],
            ParseAmbiguity::EmptyMemoryField { .. }
        ));
    }

    #[test]
    fn test_content_before_label_is_skipped() {
        let (memories, ambiguities) =
            extract_memory_directives("Content: backwards Label: nope");
        assert!(memories.is_empty());
        assert!(ambiguities.is_empty());
    }

    #[test]
    fn test_combined_reply() {
        let reply = "Curiosity should go up to 8 since the user mentioned ruins.\n\
                     A new memory should be formed.\n\
                     Label: ruins Content: The user explored the northern ruins.";
        let directives = parse_reflection(reply);
        assert_eq!(directives.trait_update.as_ref().unwrap().value, 8.0);
        assert_eq!(directives.memories.len(), 1);
    }

    #[test]
    fn test_apply_directives_writes_stores() {
        let store = Arc::new(InMemoryStore::seeded());
        let state = StateHandle::from_backend(store.clone());
        let directives = parse_reflection(
            "curiosity: 9.5\nmemory time\nLabel: Alice Content: She is friendly",
        );

        let applied = apply_directives(&directives, &state);
        assert_eq!(applied.trait_written, Some(9.5));
        assert_eq!(applied.memories_written, vec!["Alice".to_string()]);
        assert!(applied.failures.is_empty());
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 9.5);
        assert_eq!(
            store.get_memory("Alice").unwrap().unwrap().content,
            "She is friendly"
        );
    }

    #[test]
    fn test_apply_empty_directives_is_noop() {
        let store = Arc::new(InMemoryStore::seeded());
        let state = StateHandle::from_backend(store.clone());
        let applied = apply_directives(&parse_reflection("curiosity unchanged"), &state);
        assert_eq!(applied, AppliedReflection::default());
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 5.0);
    }

    #[test]
    fn test_generic_trait_name() {
        let update = extract_trait_update("Patience is now 4", "patience")
            .unwrap()
            .unwrap();
        assert_eq!(update.value, 4.0);
        assert_eq!(extract_trait_update("nothing here", "patience"), Ok(None));
    }
}
