//! Splits a chat reply into prose and one embedded code artifact.
//!
//! Only the first fenced block is extracted. Any later fences stay in the
//! prose verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Language reported for a fence without a tag.
pub const DEFAULT_LANGUAGE: &str = "text";

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```([\w+#.-]*)[ \t]*\r?\n((?s:.*?))\r?\n?```").expect("Invalid regex")
});

/// Result of splitting a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitResponse {
    /// The reply with the first fenced block removed, trimmed.
    /// Equals the input unchanged when no block was found.
    pub prose: String,
    /// Body of the first fenced block, without fences or blank edge lines.
    pub code: Option<String>,
    /// Fence language tag; `"text"` for an untagged fence, `None` when no
    /// block was found.
    pub language: Option<String>,
}

impl SplitResponse {
    /// Language to report to the caller, defaulting to `"text"`.
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }
}

/// Extract the first fenced code block from `raw`.
pub fn split_response(raw: &str) -> SplitResponse {
    let Some(caps) = FENCED_BLOCK.captures(raw) else {
        return SplitResponse {
            prose: raw.to_string(),
            code: None,
            language: None,
        };
    };

    // group 0 always exists on a successful match
    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let tag = caps.get(1).map_or("", |m| m.as_str());
    let body = caps.get(2).map_or("", |m| m.as_str());

    let language = if tag.is_empty() {
        DEFAULT_LANGUAGE.to_string()
    } else {
        tag.to_string()
    };

    let mut prose = String::with_capacity(raw.len() - whole.len());
    prose.push_str(&raw[..whole.start]);
    prose.push_str(&raw[whole.end..]);

    SplitResponse {
        prose: prose.trim().to_string(),
        code: Some(trim_blank_lines(body)),
        language: Some(language),
    }
}

/// Drop leading and trailing whitespace-only lines, keeping indentation of
/// the lines in between.
fn trim_blank_lines(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}
