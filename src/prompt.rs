//! Prompt composition.
//!
//! [`compose`] wraps the user's question and the rendered match records in a
//! fixed instruction block. It performs no I/O and is deterministic: record
//! fields render in key order.

use std::fmt;

use serde_json::Value;

use crate::matcher::Record;

/// Sentence rendered in place of the context block when nothing matched.
pub const NO_MATCHES_PHRASE: &str = "No matching data was found in the knowledge base.";

const FIELD_SEPARATOR: &str = "; ";
const RECORD_SEPARATOR: &str = "\n";

/// The full text sent to the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the prompt for `user_message` given the retrieved `matches`.
pub fn compose(user_message: &str, matches: &[Record]) -> Prompt {
    let context = render_matches(matches);
    Prompt(format!(
        "User asked: {user_message}\n\
         \n\
         Here's what I found in the knowledge base:\n\
         {context}\n\
         \n\
         Instructions:\n\
         - When knowledge base data is present, prefer it over your general knowledge. \
         If the two contradict, prioritize the knowledge base.\n\
         - If no knowledge base data was found, say so explicitly before answering from general knowledge.\n\
         - Keep the answer concise."
    ))
}

/// Renders records one per line as `field: value` pairs.
pub fn render_matches(matches: &[Record]) -> String {
    if matches.is_empty() {
        return NO_MATCHES_PHRASE.to_string();
    }

    matches
        .iter()
        .map(render_record)
        .collect::<Vec<_>>()
        .join(RECORD_SEPARATOR)
}

fn render_record(record: &Record) -> String {
    let mut fields: Vec<(&String, &Value)> = record.fields().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
        .into_iter()
        .map(|(field, value)| format!("{}: {}", field, render_value(value)))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.replace('\n', " "),
        other => other.to_string(),
    }
}
