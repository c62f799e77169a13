//! Message types for Claude Code NDJSON protocol.

use serde::{Deserialize, Serialize};

/// Canonical message types from Claude Code.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SystemInit(SystemInit),
    Assistant(AssistantMessage),
    StreamEvent(StreamEvent),
    Result(SessionResult),
    /// Free-form output, including the fallback for non-JSON lines.
    Text { content: String },
    /// Any other record type, including tool-result `user` echoes.
    Unknown { msg_type: String },
}

/// System initialization message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInit {
    pub session_id: String,
    pub model: String,
}

/// Complete assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantMessage {
    pub model: Option<String>,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl AssistantMessage {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse => None,
            })
            .collect()
    }
}

/// Content block in assistant message. Tool calls carry no caller-visible
/// text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text { text: String },
    ToolUse,
}

/// Reason the assistant stopped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
}

impl Usage {
    /// Prompt-side tokens, cache reads and writes included.
    pub const fn prompt_tokens(&self) -> u32 {
        self.input_tokens
            .saturating_add(self.cache_read_input_tokens)
            .saturating_add(self.cache_creation_input_tokens)
    }

    pub const fn is_empty(&self) -> bool {
        self.prompt_tokens() == 0 && self.output_tokens == 0
    }
}

/// Streaming event for real-time output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub event_type: StreamEventType,
}

/// Stream event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventType {
    ContentBlockDelta(Delta),
    MessageStart,
    MessageDelta { stop_reason: Option<String> },
    MessageStop,
    /// Block boundaries and anything newer than this parser.
    Other,
}

/// Delta content in streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Text(String),
    /// Tool input JSON and other non-text deltas.
    Other,
}

/// Session completion result.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub subtype: ResultSubtype,
    pub session_id: String,
    pub is_error: bool,
    /// Final response text, when the CLI includes it.
    pub result: Option<String>,
    pub duration_ms: u64,
    pub num_turns: u32,
    pub cost_usd: Option<f64>,
    pub usage: Usage,
}

/// Result subtype.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultSubtype {
    #[default]
    Success,
    Error(String),
    Unknown(String),
}
