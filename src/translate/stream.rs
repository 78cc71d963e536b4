//! Streaming event types and the SSE state machine that turns Cloud Code's
//! streaming Gemini responses into Anthropic Messages API stream events.
//!
//! Ported from `providers/gemini/models/stream.rs` (event types) and
//! `providers/gemini/transport/sse.rs` (the parser), with two deliberate
//! deviations:
//!
//! - an empty stream (no content parts ever seen) synthesizes a minimal
//!   `message_start` / `message_stop` pair instead of an `error` event, so
//!   callers never have to special-case a response with zero output.
//! - an unmapped `finishReason` resolves to `None` rather than `EndTurn`,
//!   so a genuinely unknown upstream reason doesn't masquerade as a clean
//!   stop.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::constants::{get_model_family, ModelFamily, MIN_SIGNATURE_LENGTH};
use crate::thinking::GLOBAL_SIGNATURE_CACHE;
use crate::translate::anthropic::{ContentBlock, Role};
use crate::translate::error::TranslateError;
use crate::translate::response::{StopReason, Usage};

/// A streaming event from the Messages API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: PartialMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamError,
    },
}

impl StreamEvent {
    pub fn message_start(message: PartialMessage) -> Self {
        StreamEvent::MessageStart { message }
    }

    pub fn content_block_start(index: usize, content_block: ContentBlock) -> Self {
        StreamEvent::ContentBlockStart { index, content_block }
    }

    pub fn content_block_delta(index: usize, delta: ContentDelta) -> Self {
        StreamEvent::ContentBlockDelta { index, delta }
    }

    pub fn content_block_stop(index: usize) -> Self {
        StreamEvent::ContentBlockStop { index }
    }

    pub fn message_delta(delta: MessageDelta, usage: Option<Usage>) -> Self {
        StreamEvent::MessageDelta { delta, usage }
    }

    pub fn message_stop() -> Self {
        StreamEvent::MessageStop
    }

    pub fn ping() -> Self {
        StreamEvent::Ping
    }

    pub fn error(error: StreamError) -> Self {
        StreamEvent::Error { error }
    }

    pub fn is_message_start(&self) -> bool {
        matches!(self, StreamEvent::MessageStart { .. })
    }

    pub fn is_content_block_start(&self) -> bool {
        matches!(self, StreamEvent::ContentBlockStart { .. })
    }

    pub fn is_content_block_delta(&self) -> bool {
        matches!(self, StreamEvent::ContentBlockDelta { .. })
    }

    pub fn is_content_block_stop(&self) -> bool {
        matches!(self, StreamEvent::ContentBlockStop { .. })
    }

    pub fn is_message_delta(&self) -> bool {
        matches!(self, StreamEvent::MessageDelta { .. })
    }

    pub fn is_message_stop(&self) -> bool {
        matches!(self, StreamEvent::MessageStop)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error { .. })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Ping => "ping",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Delta types for incremental content updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
}

impl ContentDelta {
    pub fn text(text: impl Into<String>) -> Self {
        ContentDelta::TextDelta { text: text.into() }
    }

    pub fn input_json(partial_json: impl Into<String>) -> Self {
        ContentDelta::InputJsonDelta { partial_json: partial_json.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        ContentDelta::ThinkingDelta { thinking: thinking.into() }
    }

    pub fn signature(signature: impl Into<String>) -> Self {
        ContentDelta::SignatureDelta { signature: signature.into() }
    }

    pub fn is_signature(&self) -> bool {
        matches!(self, ContentDelta::SignatureDelta { .. })
    }
}

/// Final stop-reason/stop-sequence metadata sent in `message_delta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

impl MessageDelta {
    pub fn new(stop_reason: Option<StopReason>) -> Self {
        Self { stop_reason, stop_sequence: None }
    }
}

/// Partial message sent at the start of streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialMessage {
    pub id: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

fn default_message_type() -> String {
    "message".to_string()
}

impl PartialMessage {
    pub fn with_usage(id: impl Into<String>, model: impl Into<String>, usage: Usage) -> Self {
        Self {
            id: id.into(),
            message_type: "message".to_string(),
            role: Role::Assistant,
            content: Vec::new(),
            model: model.into(),
            usage: Some(usage),
        }
    }
}

/// Error payload carried by a streaming `error` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl StreamError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self { error_type: error_type.into(), message: message.into() }
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new("api_error", message)
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for StreamError {}

pin_project! {
    /// SSE stream parser that converts Cloud Code responses to Anthropic events.
    pub struct SseStream<S> {
        #[pin]
        byte_stream: S,
        state: StreamState,
        buffer: String,
        pending_events: VecDeque<StreamEvent>,
    }
}

impl<S> SseStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    pub fn new(byte_stream: S, model: impl Into<String>) -> Self {
        Self {
            byte_stream,
            state: StreamState::new(model.into()),
            buffer: String::new(),
            pending_events: VecDeque::new(),
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    type Item = Result<StreamEvent, TranslateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(event) = this.pending_events.pop_front() {
            return Poll::Ready(Some(Ok(event)));
        }

        loop {
            match this.byte_stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let text = String::from_utf8_lossy(&chunk);
                    this.buffer.push_str(&text);

                    while let Some(newline_pos) = this.buffer.find('\n') {
                        let line = this.buffer[..newline_pos].to_string();
                        *this.buffer = this.buffer[newline_pos + 1..].to_string();

                        let events = process_sse_line(&line, this.state);
                        this.pending_events.extend(events);
                    }

                    if let Some(event) = this.pending_events.pop_front() {
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(TranslateError::Upstream(e.to_string()))))
                }
                Poll::Ready(None) => {
                    if !this.buffer.is_empty() {
                        let line = std::mem::take(this.buffer);
                        let events = process_sse_line(&line, this.state);
                        this.pending_events.extend(events);
                    }

                    this.pending_events.extend(finalize_stream(this.state));

                    if let Some(event) = this.pending_events.pop_front() {
                        return Poll::Ready(Some(Ok(event)));
                    } else {
                        return Poll::Ready(None);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Internal state carried across SSE lines for one stream.
struct StreamState {
    message_id: String,
    has_emitted_start: bool,
    block_index: usize,
    current_block_type: Option<BlockType>,
    current_thinking_signature: String,
    input_tokens: u32,
    output_tokens: u32,
    cache_read_tokens: u32,
    stop_reason: Option<StopReason>,
    model: String,
    model_family: ModelFamily,
}

impl StreamState {
    fn new(model: String) -> Self {
        let model_family = get_model_family(&model);
        Self {
            message_id: generate_message_id(),
            has_emitted_start: false,
            block_index: 0,
            current_block_type: None,
            current_thinking_signature: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            stop_reason: None,
            model,
            model_family,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    Text,
    Thinking,
    ToolUse,
}

fn process_sse_line(line: &str, state: &mut StreamState) -> Vec<StreamEvent> {
    let line = line.trim();

    if line.is_empty() || line.starts_with(':') {
        return vec![];
    }
    if !line.starts_with("data:") {
        return vec![];
    }

    let json_text = line[5..].trim();
    if json_text.is_empty() || json_text == "[DONE]" {
        return vec![];
    }

    let data: SseData = match serde_json::from_str(json_text) {
        Ok(d) => d,
        Err(e) => {
            debug!(error = %e, data = %json_text.chars().take(100).collect::<String>(), "SSE parse warning");
            return vec![];
        }
    };

    process_sse_data(data, state)
}

fn process_sse_data(data: SseData, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    let inner = data.response.as_deref().unwrap_or(&data);

    if let Some(usage) = &inner.usage_metadata {
        state.input_tokens = usage.prompt_token_count;
        state.output_tokens = usage.candidates_token_count;
        state.cache_read_tokens = usage.cached_content_token_count.unwrap_or(0);
    }

    let parts = inner
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or(&[]);

    if let Some(finish_reason) =
        inner.candidates.as_ref().and_then(|c| c.first()).and_then(|c| c.finish_reason.as_deref())
    {
        if state.stop_reason.is_none() {
            state.stop_reason = map_finish_reason(finish_reason);
        }
    }

    if !state.has_emitted_start && !parts.is_empty() {
        state.has_emitted_start = true;
        events.push(emit_message_start(state));
    }

    for part in parts {
        events.extend(process_part(part, state));
    }

    events
}

fn process_part(part: &SsePart, state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if part.thought == Some(true) {
        let text = part.text.as_deref().unwrap_or("");
        let signature = part.thought_signature.as_deref().unwrap_or("");

        if state.current_block_type != Some(BlockType::Thinking) {
            events.extend(close_current_block(state));
            state.current_block_type = Some(BlockType::Thinking);
            state.current_thinking_signature.clear();
            events.push(StreamEvent::content_block_start(
                state.block_index,
                ContentBlock::thinking("", None),
            ));
        }

        if signature.len() >= MIN_SIGNATURE_LENGTH {
            state.current_thinking_signature = signature.to_string();
            GLOBAL_SIGNATURE_CACHE.store_thinking_signature(text, signature, state.model_family);
        }

        if !text.is_empty() {
            events.push(StreamEvent::content_block_delta(state.block_index, ContentDelta::thinking(text)));
        }
    } else if let Some(function_call) = &part.function_call {
        events.extend(close_current_block_with_signature(state));
        state.current_block_type = Some(BlockType::ToolUse);
        state.stop_reason = Some(StopReason::ToolUse);

        let tool_id = function_call.id.clone().unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));

        if let Some(sig) = &part.thought_signature {
            if sig.len() >= MIN_SIGNATURE_LENGTH {
                GLOBAL_SIGNATURE_CACHE.store_tool_signature(&tool_id, sig, state.model_family);
            }
        }

        events.push(StreamEvent::content_block_start(
            state.block_index,
            ContentBlock::tool_use(&tool_id, &function_call.name, serde_json::json!({})),
        ));

        let args_json = serde_json::to_string(&function_call.args).unwrap_or_else(|_| "{}".to_string());
        events.push(StreamEvent::content_block_delta(state.block_index, ContentDelta::input_json(args_json)));
    } else if let Some(text) = &part.text {
        if text.is_empty() {
            return events;
        }

        if state.current_block_type != Some(BlockType::Text) {
            events.extend(close_current_block_with_signature(state));
            state.current_block_type = Some(BlockType::Text);
            events.push(StreamEvent::content_block_start(state.block_index, ContentBlock::text("")));
        }

        events.push(StreamEvent::content_block_delta(state.block_index, ContentDelta::text(text)));
    }

    events
}

fn close_current_block_with_signature(state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(block_type) = state.current_block_type {
        if block_type == BlockType::Thinking && !state.current_thinking_signature.is_empty() {
            events.push(StreamEvent::content_block_delta(
                state.block_index,
                ContentDelta::signature(&state.current_thinking_signature),
            ));
            state.current_thinking_signature.clear();
        }

        events.push(StreamEvent::content_block_stop(state.block_index));
        state.block_index += 1;
        state.current_block_type = None;
    }

    events
}

fn close_current_block(state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if state.current_block_type.is_some() {
        events.push(StreamEvent::content_block_stop(state.block_index));
        state.block_index += 1;
        state.current_block_type = None;
    }

    events
}

/// Finalize the stream, emitting `message_delta` and `message_stop`.
///
/// If no content was ever received the stream still closes cleanly: a
/// minimal `message_start`/`message_stop` pair is synthesized rather than
/// surfacing an `error` event, since an empty generation is a valid (if
/// unusual) upstream outcome, not a transport failure.
fn finalize_stream(state: &mut StreamState) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    events.extend(close_current_block_with_signature(state));

    if !state.has_emitted_start {
        events.push(emit_message_start(state));
    }

    let usage = Usage {
        input_tokens: state.input_tokens.saturating_sub(state.cache_read_tokens),
        output_tokens: state.output_tokens,
        cache_read_input_tokens: if state.cache_read_tokens > 0 { Some(state.cache_read_tokens) } else { None },
        cache_creation_input_tokens: None,
    };

    events.push(StreamEvent::message_delta(MessageDelta::new(state.stop_reason), Some(usage)));
    events.push(StreamEvent::message_stop());

    events
}

fn emit_message_start(state: &StreamState) -> StreamEvent {
    let usage = Usage {
        input_tokens: state.input_tokens.saturating_sub(state.cache_read_tokens),
        output_tokens: 0,
        cache_read_input_tokens: if state.cache_read_tokens > 0 { Some(state.cache_read_tokens) } else { None },
        cache_creation_input_tokens: None,
    };

    StreamEvent::message_start(PartialMessage::with_usage(&state.message_id, &state.model, usage))
}

/// Map a Google finish reason to an Anthropic stop reason.
///
/// An unrecognized reason resolves to `None` rather than `EndTurn`: a
/// stop reason we can't place shouldn't masquerade as a clean finish.
fn map_finish_reason(reason: &str) -> Option<StopReason> {
    match reason {
        "STOP" => Some(StopReason::EndTurn),
        "MAX_TOKENS" => Some(StopReason::MaxTokens),
        "TOOL_USE" => Some(StopReason::ToolUse),
        "SAFETY" | "RECITATION" => Some(StopReason::EndTurn),
        _ => None,
    }
}

fn generate_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SseData {
    #[serde(default)]
    response: Option<Box<SseData>>,
    #[serde(default)]
    candidates: Option<Vec<SseCandidate>>,
    #[serde(default)]
    usage_metadata: Option<SseUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SseCandidate {
    #[serde(default)]
    content: Option<SseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SseContent {
    #[serde(default)]
    parts: Vec<SsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default)]
    thought_signature: Option<String>,
    #[serde(default)]
    function_call: Option<SseFunctionCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SseFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SseUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    cached_content_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_finish_reason() {
        assert_eq!(map_finish_reason("STOP"), Some(StopReason::EndTurn));
        assert_eq!(map_finish_reason("MAX_TOKENS"), Some(StopReason::MaxTokens));
        assert_eq!(map_finish_reason("TOOL_USE"), Some(StopReason::ToolUse));
        assert_eq!(map_finish_reason("SAFETY"), Some(StopReason::EndTurn));
        assert_eq!(map_finish_reason("WEIRD_UNMAPPED_REASON"), None);
    }

    #[test]
    fn test_process_sse_line_empty_and_comment_and_done() {
        let mut state = StreamState::new("claude-sonnet-4-5".to_string());

        assert!(process_sse_line("", &mut state).is_empty());
        assert!(process_sse_line(": a comment", &mut state).is_empty());
        assert!(process_sse_line("event: message", &mut state).is_empty());
        assert!(process_sse_line("data: [DONE]", &mut state).is_empty());
    }

    #[test]
    fn test_process_sse_line_text() {
        let mut state = StreamState::new("claude-sonnet-4-5".to_string());
        state.has_emitted_start = true;

        let json = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#;
        let events = process_sse_line(json, &mut state);

        assert!(events.iter().any(|e| e.is_content_block_start()));
        assert!(events.iter().any(|e| e.is_content_block_delta()));
    }

    #[test]
    fn test_process_sse_line_thinking_caches_signature() {
        let mut state = StreamState::new("gemini-3-flash".to_string());
        state.has_emitted_start = true;

        let sig = "s".repeat(60);
        let json = format!(
            r#"data: {{"candidates":[{{"content":{{"parts":[{{"thought":true,"text":"pondering","thoughtSignature":"{sig}"}}]}}}}]}}"#
        );
        let events = process_sse_line(&json, &mut state);

        assert_eq!(state.current_block_type, Some(BlockType::Thinking));
        assert!(events.iter().any(|e| e.is_content_block_delta()));
        assert_eq!(GLOBAL_SIGNATURE_CACHE.get_thinking_signature("pondering"), Some(sig));
    }

    #[test]
    fn test_process_sse_line_function_call() {
        let mut state = StreamState::new("claude-sonnet-4-5".to_string());
        state.has_emitted_start = true;

        let json = r#"data: {"candidates":[{"content":{"parts":[{"functionCall":{"name":"get_weather","args":{"location":"NYC"}}}]}}]}"#;
        let events = process_sse_line(json, &mut state);

        assert_eq!(state.current_block_type, Some(BlockType::ToolUse));
        assert_eq!(state.stop_reason, Some(StopReason::ToolUse));
        assert!(!events.is_empty());
    }

    #[test]
    fn test_process_sse_line_usage_metadata() {
        let mut state = StreamState::new("claude-sonnet-4-5".to_string());

        let json = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hi"}]}}],"usageMetadata":{"promptTokenCount":100,"candidatesTokenCount":50,"cachedContentTokenCount":20}}"#;
        process_sse_line(json, &mut state);

        assert_eq!(state.input_tokens, 100);
        assert_eq!(state.output_tokens, 50);
        assert_eq!(state.cache_read_tokens, 20);
    }

    #[test]
    fn test_process_sse_line_invalid_json_does_not_panic() {
        let mut state = StreamState::new("claude-sonnet-4-5".to_string());
        assert!(process_sse_line("data: {not valid json}", &mut state).is_empty());
    }

    #[test]
    fn test_finalize_stream_with_content() {
        let mut state = StreamState::new("claude-sonnet-4-5".to_string());
        state.has_emitted_start = true;
        state.input_tokens = 100;
        state.output_tokens = 50;

        let events = finalize_stream(&mut state);

        assert!(events.iter().any(|e| e.is_message_delta()));
        assert!(events.iter().any(|e| e.is_message_stop()));
    }

    #[test]
    fn test_finalize_stream_empty_synthesizes_start_instead_of_error() {
        let mut state = StreamState::new("claude-sonnet-4-5".to_string());

        let events = finalize_stream(&mut state);

        assert!(events.iter().any(|e| e.is_message_start()));
        assert!(events.iter().any(|e| e.is_message_delta()));
        assert!(events.iter().any(|e| e.is_message_stop()));
        assert!(!events.iter().any(|e| e.is_error()));
    }

    #[test]
    fn test_close_current_block_with_signature() {
        let mut state = StreamState::new("gemini-3-flash".to_string());
        state.current_block_type = Some(BlockType::Thinking);
        state.current_thinking_signature = "sig_".repeat(20);
        state.block_index = 0;

        let events = close_current_block_with_signature(&mut state);

        assert!(events.iter().any(|e| matches!(e, StreamEvent::ContentBlockDelta { delta, .. } if delta.is_signature())));
        assert!(events.iter().any(|e| e.is_content_block_stop()));
        assert_eq!(state.block_index, 1);
        assert!(state.current_block_type.is_none());
    }

    #[test]
    fn test_stream_event_serialization_tags() {
        let event = StreamEvent::content_block_delta(0, ContentDelta::text("Hello"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_block_delta");
        assert_eq!(json["delta"]["type"], "text_delta");
    }

    #[test]
    fn test_sse_data_nested_response() {
        let json = r#"{"response":{"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]}}"#;
        let data: SseData = serde_json::from_str(json).unwrap();
        assert!(data.response.is_some());
    }
}
