//! Tolerant parsing of assignee query responses.
//!
//! The response is expected to be a JSON object with an `assignees` array of
//! objects carrying optional `assignee_id` and `assignee_organization`
//! strings. Only a body that is not JSON, or whose top level is not an
//! object, is an error. Every other irregularity degrades to a default.

use crate::error::FetchError;
use crate::types::AssigneeRecord;
use serde_json::Value;

/// One assignee extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssigneeEntry {
    pub assignee_id: String,
    pub assignee_organization: String,
}

/// Structured result of parsing one response body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedAssignees {
    /// Well-formed assignee elements, in response order
    pub entries: Vec<AssigneeEntry>,

    /// Array elements that were not objects and were skipped
    pub skipped: usize,
}

impl ParsedAssignees {
    /// Flatten into output rows for `patent_id`.
    ///
    /// A response without usable assignees yields exactly one placeholder
    /// row with empty fields.
    pub fn into_records(self, patent_id: &str) -> Vec<AssigneeRecord> {
        if self.entries.is_empty() {
            return vec![AssigneeRecord::empty(patent_id)];
        }

        self.entries
            .into_iter()
            .map(|entry| {
                AssigneeRecord::new(patent_id, entry.assignee_id, entry.assignee_organization)
            })
            .collect()
    }
}

/// Parse a raw response body for `patent_id`.
pub fn parse_response(patent_id: &str, body: &[u8]) -> Result<ParsedAssignees, FetchError> {
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::parse(patent_id, format!("invalid JSON: {}", e)))?;

    extract_assignees(patent_id, &json)
}

/// Extract assignee entries from an already decoded response.
///
/// # Rules
///
/// - Top level not an object: `FetchError::Parse`.
/// - `assignees` absent, not an array, or empty: no entries (the caller
///   writes one placeholder row).
/// - An element that is not an object is skipped and counted in `skipped`.
/// - `assignee_id` / `assignee_organization` absent or not a string: `""`.
pub fn extract_assignees(patent_id: &str, json: &Value) -> Result<ParsedAssignees, FetchError> {
    let object = json.as_object().ok_or_else(|| {
        FetchError::parse(
            patent_id,
            format!("expected a JSON object, got {}", value_kind(json)),
        )
    })?;

    let mut parsed = ParsedAssignees::default();

    let Some(assignees) = object.get("assignees").and_then(|a| a.as_array()) else {
        return Ok(parsed);
    };

    for assignee in assignees {
        match assignee.as_object() {
            Some(fields) => parsed.entries.push(AssigneeEntry {
                assignee_id: string_field(fields.get("assignee_id")),
                assignee_organization: string_field(fields.get("assignee_organization")),
            }),
            None => {
                tracing::warn!(
                    patent_id,
                    element = value_kind(assignee),
                    "skipping malformed assignee element"
                );
                parsed.skipped += 1;
            }
        }
    }

    Ok(parsed)
}

fn string_field(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_default()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
