//! NDJSON parser for Claude Code protocol.
//!
//! Implements tolerant reader pattern: unknown fields ignored, unknown types kept.

use serde_json::Value;

use super::types::*;
use crate::error::{Error, Result};

/// Parse a single NDJSON line from Claude's stdout.
pub fn parse_line(line: &str) -> Result<Message> {
    let raw: Value = serde_json::from_str(line)?;
    parse_value(&raw)
}

/// Parse a JSON value into a canonical message.
pub fn parse_value(raw: &Value) -> Result<Message> {
    let msg_type = raw
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::NdjsonParse("Missing 'type' field".into()))?;

    match msg_type {
        "system" => Ok(parse_system(raw)),
        "assistant" => Ok(parse_assistant(raw)),
        "stream_event" => Ok(parse_stream_event(raw)),
        "result" => Ok(parse_result(raw)),
        "text" => Ok(Message::Text {
            content: str_field(raw, "content")
                .or_else(|| str_field(raw, "text"))
                .unwrap_or_default(),
        }),
        _ => Ok(Message::Unknown {
            msg_type: msg_type.to_string(),
        }),
    }
}

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn parse_system(raw: &Value) -> Message {
    Message::SystemInit(SystemInit {
        session_id: str_field(raw, "session_id").unwrap_or_default(),
        model: str_field(raw, "model").unwrap_or_default(),
    })
}

fn parse_assistant(raw: &Value) -> Message {
    let msg = raw.get("message").unwrap_or(raw);

    Message::Assistant(AssistantMessage {
        model: str_field(msg, "model"),
        content: parse_content_blocks(msg.get("content")),
        stop_reason: parse_stop_reason(msg.get("stop_reason")),
        usage: parse_usage(msg.get("usage")),
    })
}

fn parse_content_blocks(content: Option<&Value>) -> Vec<ContentBlock> {
    match content {
        Some(Value::String(text)) => vec![ContentBlock::Text { text: text.clone() }],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|block| {
                let block_type = block.get("type")?.as_str()?;
                match block_type {
                    "text" => {
                        let text = block.get("text")?.as_str()?.to_string();
                        Some(ContentBlock::Text { text })
                    }
                    "tool_use" => Some(ContentBlock::ToolUse),
                    _ => None,
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_stop_reason(val: Option<&Value>) -> StopReason {
    match val.and_then(|v| v.as_str()) {
        Some("end_turn") | None => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some(_) => StopReason::Other,
    }
}

pub(crate) fn parse_usage(val: Option<&Value>) -> Usage {
    val.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn parse_stream_event(raw: &Value) -> Message {
    let event = raw.get("event").unwrap_or(raw);
    let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");

    let stream_type = match event_type {
        "content_block_delta" => {
            let delta = event.get("delta");
            match delta.and_then(|d| d.get("type")).and_then(|v| v.as_str()) {
                Some("text_delta") => StreamEventType::ContentBlockDelta(Delta::Text(
                    delta
                        .and_then(|d| str_field(d, "text"))
                        .unwrap_or_default(),
                )),
                _ => StreamEventType::ContentBlockDelta(Delta::Other),
            }
        }
        "message_start" => StreamEventType::MessageStart,
        "message_delta" => StreamEventType::MessageDelta {
            stop_reason: event
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(String::from),
        },
        "message_stop" => StreamEventType::MessageStop,
        _ => StreamEventType::Other,
    };

    Message::StreamEvent(StreamEvent {
        event_type: stream_type,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn parse_result(raw: &Value) -> Message {
    let subtype = match raw.get("subtype").and_then(|v| v.as_str()) {
        Some("success") | None => ResultSubtype::Success,
        Some(other) if other.starts_with("error") => ResultSubtype::Error(other.to_string()),
        Some(other) => ResultSubtype::Unknown(other.to_string()),
    };
    let is_error = raw
        .get("is_error")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(matches!(subtype, ResultSubtype::Error(_)));

    // Older builds nest the final text under `message.content`.
    let result = str_field(raw, "result").or_else(|| {
        raw.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(String::from)
    });

    Message::Result(SessionResult {
        subtype,
        session_id: str_field(raw, "session_id").unwrap_or_default(),
        is_error,
        result,
        duration_ms: raw
            .get("duration_ms")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0),
        num_turns: raw
            .get("num_turns")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
        cost_usd: raw
            .get("total_cost_usd")
            .or_else(|| raw.get("cost_usd"))
            .and_then(serde_json::Value::as_f64),
        usage: parse_usage(raw.get("usage")),
    })
}
