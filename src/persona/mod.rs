//! Persona state: the scalar trait vector, labeled memories, and the
//! interaction records that feed the rolling conversation window.
//!
//! These are plain data types. Persistence lives in
//! [`crate::memory::storage`]; mutation policy lives in
//! [`crate::chat::reflection`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lower bound for every persona trait.
pub const TRAIT_MIN: f64 = 0.0;

/// Upper bound for every persona trait.
pub const TRAIT_MAX: f64 = 10.0;

/// Name of the trait seeded at first initialization.
pub const CURIOSITY: &str = "curiosity";

/// Value reported for `curiosity` when the store has no row for it.
pub const DEFAULT_CURIOSITY: f64 = 5.0;

/// Default persona name used in transcripts and prompts.
pub const DEFAULT_PERSONA_NAME: &str = "Zoral";

/// A named scalar attribute of the persona, bounded in `[0, 10]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaTrait {
    /// Unique trait name.
    pub name: String,
    /// Current value, always within `[TRAIT_MIN, TRAIT_MAX]`.
    pub value: f64,
    /// When the value was last written.
    pub updated_at: DateTime<Utc>,
}

/// A labeled free-text fact. Writing an existing label replaces the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub label: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One persisted exchange between an actor and the persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Monotonic sequence assigned by the log. The only ordering guarantee.
    pub id: i64,
    pub actor: String,
    pub input: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// An interaction that has not been appended yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInteraction {
    pub actor: String,
    pub input: String,
    pub response: String,
}

impl NewInteraction {
    pub fn new(
        actor: impl Into<String>,
        input: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            input: input.into(),
            response: response.into(),
        }
    }
}

/// Clamp a proposed trait value into `[TRAIT_MIN, TRAIT_MAX]`.
///
/// `NaN` has no meaningful position in the range and maps to `None`.
pub fn clamp_trait_value(value: f64) -> Option<f64> {
    if value.is_nan() {
        return None;
    }
    Some(value.clamp(TRAIT_MIN, TRAIT_MAX))
}

/// Default reported for a trait that has never been written.
pub fn default_trait_value(name: &str) -> Option<f64> {
    match name {
        CURIOSITY => Some(DEFAULT_CURIOSITY),
        _ => None,
    }
}

/// Render a trait value for prompts: whole numbers keep one decimal
/// (`5.0`), fractional values print as-is (`7.25`).
pub fn format_trait_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_within_range_is_identity() {
        assert_eq!(clamp_trait_value(7.5), Some(7.5));
        assert_eq!(clamp_trait_value(0.0), Some(0.0));
        assert_eq!(clamp_trait_value(10.0), Some(10.0));
    }

    #[test]
    fn test_clamp_out_of_range() {
        assert_eq!(clamp_trait_value(15.0), Some(10.0));
        assert_eq!(clamp_trait_value(-2.0), Some(0.0));
        assert_eq!(clamp_trait_value(f64::INFINITY), Some(10.0));
        assert_eq!(clamp_trait_value(f64::NAN), None);
    }

    #[test]
    fn test_default_trait_value() {
        assert_eq!(default_trait_value("curiosity"), Some(5.0));
        assert_eq!(default_trait_value("patience"), None);
    }

    #[test]
    fn test_format_trait_value() {
        assert_eq!(format_trait_value(5.0), "5.0");
        assert_eq!(format_trait_value(7.5), "7.5");
        assert_eq!(format_trait_value(10.0), "10.0");
    }
}
