//! Detection of nested integer arrays stored in text columns
//!
//! Text whose first and last characters are a matching bracket pair is
//! tried as a JSON list of integer lists, e.g. `[[1,2],[3]]`. Each inner
//! list becomes one `<mem>` member. Anything that fails to parse is kept as
//! plain text.

use tracing::warn;

/// Rendered content of a text column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedValue {
    PlainText(String),
    StructuredMembers(Vec<Vec<i64>>),
}

/// Outcome of inspecting one text value
#[derive(Debug)]
pub enum Detection {
    /// Not bracketed; plain text
    NotCandidate,
    /// Bracketed and parsed as a list of integer lists
    Members(Vec<Vec<i64>>),
    /// Bracketed but not a list of integer lists
    Malformed(serde_json::Error),
}

/// First and last characters form `[...]` or `{...}`
pub fn is_candidate(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => matches!((first, last), ('[', ']') | ('{', '}')),
        _ => false,
    }
}

pub fn detect(text: &str) -> Detection {
    if !is_candidate(text) {
        return Detection::NotCandidate;
    }
    match serde_json::from_str::<Vec<Vec<i64>>>(text) {
        Ok(members) => Detection::Members(members),
        Err(err) => Detection::Malformed(err),
    }
}

/// Render a text value, falling back to the original text on parse failure.
///
/// `column` only labels the warning emitted for malformed payloads.
pub fn render(text: &str, column: &str) -> RenderedValue {
    match detect(text) {
        Detection::NotCandidate => RenderedValue::PlainText(text.to_string()),
        Detection::Members(members) => RenderedValue::StructuredMembers(members),
        Detection::Malformed(err) => {
            warn!(column, error = %err, text, "malformed structured text, writing it verbatim");
            RenderedValue::PlainText(text.to_string())
        }
    }
}

/// Space-joined integers of one member
pub fn member_text(member: &[i64]) -> String {
    member
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
