//! Raw event record as emitted on Claude's stdout.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::parser::parse_value;
use super::types::Message;
use crate::error::Result;

/// One decoded stdout line.
///
/// The shape varies by `type`, so the record keeps the full JSON object and
/// only exposes the few fields the supervisor itself needs. Use
/// [`EventRecord::message`] for a typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord(Value);

impl EventRecord {
    /// Decode a single stdout line (without its terminator).
    ///
    /// Anything that is not a JSON object is wrapped as a text record carrying
    /// the line verbatim, so no data line is ever lost.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => Self(value),
            _ => Self::text(line),
        }
    }

    /// Build a `{"type":"text","content":...}` record.
    pub fn text(content: impl Into<String>) -> Self {
        Self(json!({ "type": "text", "content": content.into() }))
    }

    /// Wrap an already-decoded JSON value.
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// The `type` discriminator, if present.
    pub fn record_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// Session identifier reported by the process, if this record carries a
    /// non-empty one.
    pub fn session_id(&self) -> Option<&str> {
        self.0
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Typed view of the record.
    pub fn message(&self) -> Result<Message> {
        parse_value(&self.0)
    }

    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for EventRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
