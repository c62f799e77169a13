//! Event record to OpenAI chunk translation.
//!
//! Converts the records of one Claude session into `chat.completion.chunk`
//! objects: a role chunk, one chunk per content fragment, and a final chunk
//! carrying the finish reason and usage.

use std::time::{SystemTime, UNIX_EPOCH};

use ccgw_core::EventRecord;
use ccgw_core::ndjson::{
    AssistantMessage, Delta, Message, SessionResult, StopReason, StreamEvent, StreamEventType,
    Usage,
};
use ccgw_core::openai::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, Choice, ChunkChoice, ChunkDelta,
    CompletionUsage, FinishReason, Role,
};
use tracing::{debug, warn};

/// Data of the SSE event that terminates a completion stream.
pub const DONE_MARKER: &str = "[DONE]";

const TURN_SEPARATOR: &str = "\n\n";
const LINE_SEPARATOR: &str = "\n";

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Per-response translation state.
#[derive(Debug)]
pub struct StreamTranslator {
    id: String,
    created: u64,
    model: String,
    emitted_text: bool,
    saw_deltas: bool,
    pending_separator: bool,
    finish_reason: FinishReason,
    assistant_usage: Option<Usage>,
    result_usage: Option<Usage>,
}

impl StreamTranslator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            created: unix_now(),
            model: model.into(),
            emitted_text: false,
            saw_deltas: false,
            pending_separator: false,
            finish_reason: FinishReason::Stop,
            assistant_usage: None,
            result_usage: None,
        }
    }

    fn chunk(
        &self,
        delta: ChunkDelta,
        finish_reason: Option<FinishReason>,
        usage: Option<CompletionUsage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }

    /// Opening chunk announcing the assistant role.
    pub fn role_chunk(&self) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                role: Some(Role::Assistant),
                content: Some(String::new()),
            },
            None,
            None,
        )
    }

    /// Content chunks produced by one record.
    pub fn convert(&mut self, record: &EventRecord) -> Vec<ChatCompletionChunk> {
        self.fragments(record)
            .into_iter()
            .map(|content| {
                self.chunk(
                    ChunkDelta {
                        role: None,
                        content: Some(content),
                    },
                    None,
                    None,
                )
            })
            .collect()
    }

    /// Closing chunk with finish reason and usage.
    pub fn final_chunk(&self) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta::default(),
            Some(self.finish_reason),
            Some(self.usage()),
        )
    }

    pub const fn finish_reason(&self) -> FinishReason {
        self.finish_reason
    }

    /// Usage from the result record, else the last assistant message.
    pub fn usage(&self) -> CompletionUsage {
        let usage = self
            .result_usage
            .or(self.assistant_usage)
            .unwrap_or_default();
        CompletionUsage::new(usage.prompt_tokens(), usage.output_tokens)
    }

    /// Text fragments carried by one record, in emission order.
    pub fn fragments(&mut self, record: &EventRecord) -> Vec<String> {
        let message = match record.message() {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Skipping undecodable record");
                return Vec::new();
            }
        };

        match message {
            Message::SystemInit(init) => {
                debug!(session_id = %init.session_id, model = %init.model, "Claude session initialized");
                Vec::new()
            }
            Message::Assistant(msg) => self.handle_assistant(&msg),
            Message::StreamEvent(event) => self.handle_stream_event(event),
            Message::Result(result) => self.handle_result(result),
            Message::Text { content } => self.handle_text(content),
            Message::Unknown { msg_type, .. } => {
                debug!(msg_type, "Ignoring record");
                Vec::new()
            }
        }
    }

    fn emit(&mut self, text: String) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.emitted_text = true;
        vec![text]
    }

    /// Plain output lines keep their line breaks once rendered.
    fn handle_text(&mut self, text: String) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if self.emitted_text {
            self.emit(format!("{LINE_SEPARATOR}{text}"))
        } else {
            self.emit(text)
        }
    }

    fn handle_assistant(&mut self, msg: &AssistantMessage) -> Vec<String> {
        if matches!(msg.stop_reason, StopReason::MaxTokens) {
            self.finish_reason = FinishReason::Length;
        }
        if !msg.usage.is_empty() {
            self.assistant_usage = Some(msg.usage);
        }

        // Partial messages already delivered this text.
        if self.saw_deltas {
            return Vec::new();
        }

        let text = msg.text();
        if text.is_empty() {
            return Vec::new();
        }
        if self.emitted_text {
            self.emit(format!("{TURN_SEPARATOR}{text}"))
        } else {
            self.emit(text)
        }
    }

    fn handle_stream_event(&mut self, event: StreamEvent) -> Vec<String> {
        match event.event_type {
            StreamEventType::MessageStart => {
                self.pending_separator = self.emitted_text;
                Vec::new()
            }
            StreamEventType::ContentBlockDelta(Delta::Text(text)) => {
                self.saw_deltas = true;
                if text.is_empty() {
                    return Vec::new();
                }
                if std::mem::take(&mut self.pending_separator) {
                    self.emit(format!("{TURN_SEPARATOR}{text}"))
                } else {
                    self.emit(text)
                }
            }
            StreamEventType::MessageDelta {
                stop_reason: Some(reason),
            } if reason == "max_tokens" => {
                self.finish_reason = FinishReason::Length;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn handle_result(&mut self, result: SessionResult) -> Vec<String> {
        if !result.usage.is_empty() {
            self.result_usage = Some(result.usage);
        }
        if result.is_error {
            warn!(
                session_id = %result.session_id,
                subtype = ?result.subtype,
                "Claude reported an error result"
            );
        } else {
            debug!(
                session_id = %result.session_id,
                duration_ms = result.duration_ms,
                num_turns = result.num_turns,
                cost_usd = ?result.cost_usd,
                "Claude turn complete"
            );
        }

        match result.result {
            Some(text) if !self.emitted_text => self.emit(text),
            _ => Vec::new(),
        }
    }

    /// Build a non-streaming completion from accumulated content.
    pub fn completion(&self, content: String) -> ChatCompletion {
        ChatCompletion {
            id: self.id.clone(),
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::new(Role::Assistant, content),
                finish_reason: Some(self.finish_reason),
            }],
            usage: self.usage(),
        }
    }
}

/// Translate a complete record sequence into one completion.
pub fn aggregate<'a>(
    model: impl Into<String>,
    records: impl IntoIterator<Item = &'a EventRecord>,
) -> ChatCompletion {
    let mut translator = StreamTranslator::new(model);
    let mut content = String::new();
    for record in records {
        for fragment in translator.fragments(record) {
            content.push_str(&fragment);
        }
    }
    translator.completion(content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> EventRecord {
        EventRecord::from_value(value)
    }

    fn assistant(text: &str) -> EventRecord {
        rec(json!({
            "type": "assistant",
            "message": {
                "model": "claude",
                "content": [{"type": "text", "text": text}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 2}
            }
        }))
    }

    fn delta(text: &str) -> EventRecord {
        rec(json!({
            "type": "stream_event",
            "event": {
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": text}
            }
        }))
    }

    fn result(text: &str) -> EventRecord {
        rec(json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "session_id": "s",
            "result": text,
            "duration_ms": 5,
            "num_turns": 1,
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }))
    }

    fn content_of(chunk: &ChatCompletionChunk) -> Option<&str> {
        chunk.choices[0].delta.content.as_deref()
    }

    #[test]
    fn chunk_sequence_shape() {
        let mut t = StreamTranslator::new("claude-test");
        let role = t.role_chunk();
        assert_eq!(role.choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(role.object, "chat.completion.chunk");
        assert!(role.id.starts_with("chatcmpl-"));

        let records = [
            rec(json!({"type": "system", "subtype": "init", "session_id": "s", "model": "m", "cwd": "/", "tools": []})),
            assistant("Hello"),
            result("Hello"),
        ];
        let chunks: Vec<_> = records.iter().flat_map(|r| t.convert(r)).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(content_of(&chunks[0]), Some("Hello"));
        assert_eq!(chunks[0].id, role.id);

        let last = t.final_chunk();
        assert_eq!(last.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(last.choices[0].delta, ChunkDelta::default());
        assert_eq!(last.usage, Some(CompletionUsage::new(10, 4)));
    }

    #[test]
    fn deltas_suppress_the_full_assistant_message() {
        let mut t = StreamTranslator::new("m");
        let records = [delta("Hel"), delta("lo"), assistant("Hello"), result("Hello")];
        let fragments: Vec<_> = records.iter().flat_map(|r| t.fragments(r)).collect();
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[test]
    fn multiple_turns_are_separated() {
        let mut t = StreamTranslator::new("m");
        let records = [assistant("first"), assistant("second")];
        let fragments: Vec<_> = records.iter().flat_map(|r| t.fragments(r)).collect();
        assert_eq!(fragments.concat(), "first\n\nsecond");
    }

    #[test]
    fn result_text_used_only_when_nothing_else_was_emitted() {
        let completion = aggregate("m", &[result("from result")]);
        assert_eq!(
            completion.choices[0].message.content.text(),
            "from result"
        );
    }

    #[test]
    fn text_fallback_records_become_content() {
        let records = [EventRecord::from_line("not json"), result("ignored")];
        let completion = aggregate("m", &records);
        assert_eq!(completion.choices[0].message.content.text(), "not json");
    }

    #[test]
    fn consecutive_text_lines_keep_line_breaks() {
        let records = [
            EventRecord::from_line("line one"),
            EventRecord::from_line("line two"),
            EventRecord::from_line("line three"),
        ];
        let completion = aggregate("m", &records);
        assert_eq!(
            completion.choices[0].message.content.text(),
            "line one\nline two\nline three"
        );

        let mut t = StreamTranslator::new("m");
        let fragments: Vec<_> = records.iter().flat_map(|r| t.fragments(r)).collect();
        assert_eq!(fragments, vec!["line one", "\nline two", "\nline three"]);
    }

    #[test]
    fn error_result_stays_well_formed() {
        let records = [rec(json!({
            "type": "result",
            "subtype": "error_during_execution",
            "is_error": true,
            "session_id": "s",
            "result": "boom"
        }))];
        let completion = aggregate("m", &records);
        assert_eq!(completion.choices[0].message.content.text(), "boom");
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn max_tokens_maps_to_length() {
        let records = [rec(json!({
            "type": "assistant",
            "message": {
                "content": [{"type": "text", "text": "cut"}],
                "stop_reason": "max_tokens"
            }
        }))];
        let completion = aggregate("m", &records);
        assert_eq!(
            completion.choices[0].finish_reason,
            Some(FinishReason::Length)
        );
    }

    #[test]
    fn aggregate_equals_concatenated_chunks() {
        let records = [
            delta("a"),
            delta("b"),
            rec(json!({"type": "stream_event", "event": {"type": "message_start"}})),
            delta("c"),
            result("abc"),
        ];

        let mut t = StreamTranslator::new("m");
        let streamed: String = records
            .iter()
            .flat_map(|r| t.convert(r))
            .filter_map(|c| c.choices[0].delta.content.clone())
            .collect();

        let completion = aggregate("m", &records);
        assert_eq!(completion.choices[0].message.content.text(), streamed);
        assert_eq!(streamed, "ab\n\nc");
        assert_eq!(completion.usage.total_tokens, 14);
        assert_eq!(completion.object, "chat.completion");
    }
}
