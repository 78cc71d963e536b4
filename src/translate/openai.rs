//! OpenAI Chat Completions front door.
//!
//! Wire types and conversion to/from the internal Anthropic-shaped request
//! and response, so OpenAI-speaking clients can hit this gateway the same
//! way they'd hit `api.openai.com`. Grounded on `providers/types.rs`'s
//! `ChatRequest`/`ChatResponse` family and `providers/gemini/provider.rs`'s
//! `convert_request`/`convert_response` (which perform the same OpenAI <->
//! Anthropic-shaped mapping one layer up, against a single provider).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::anthropic::{
    ContentBlock, Message, MessageContent, MessagesRequest, Role, SystemPrompt, Tool, ToolChoice,
};
use super::response::{MessagesResponse, StopReason, Usage as AnthropicUsage};
use super::stream::{ContentDelta, StreamEvent};
use crate::dispatch::constants::{CLAUDE_MODELS, GEMINI_MODELS};

// ============================================================================
// Model aliasing
// ============================================================================

/// Copilot/proxy-style shorthand model names a client might send, mapped to
/// a real Cloud Code model id. Unrecognized names fall through to
/// `DEFAULT_MODEL_ALIAS` rather than failing the request outright — the
/// account pool will reject genuinely unknown models later on.
pub const MODEL_ALIASES: &[(&str, &str)] = &[
    ("opus", "claude-opus-4-5-thinking"),
    ("sonnet", "claude-sonnet-4-5"),
    ("sonnet-thinking", "claude-sonnet-4-5-thinking"),
    ("sonnet-proxy", "claude-sonnet-4-5"),
    ("claude", "claude-sonnet-4-5"),
    ("gemini", "gemini-3-pro-high"),
    ("gemini-flash", "gemini-3-flash"),
    ("gemini-pro", "gemini-3-pro-high"),
    ("gpt-4", "claude-sonnet-4-5"),
    ("gpt-4o", "claude-sonnet-4-5"),
    ("gpt-3.5-turbo", "gemini-3-flash"),
];

/// Used when a requested model matches neither a known model id nor an
/// alias.
pub const DEFAULT_MODEL_ALIAS: &str = "claude-sonnet-4-5";

/// Resolve a client-supplied model name to a real Cloud Code model id.
///
/// Exact (case-insensitive) matches against the known Claude/Gemini model
/// lists pass through unchanged; everything else is looked up in
/// [`MODEL_ALIASES`], falling back to [`DEFAULT_MODEL_ALIAS`].
pub fn resolve_model_alias(requested: &str) -> String {
    let lower = requested.to_lowercase();

    if CLAUDE_MODELS.iter().any(|m| m.eq_ignore_ascii_case(&lower)) {
        return requested.to_string();
    }
    if GEMINI_MODELS.iter().any(|m| m.eq_ignore_ascii_case(&lower)) {
        return requested.to_string();
    }

    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(&lower))
        .map(|(_, model)| model.to_string())
        .unwrap_or_else(|| DEFAULT_MODEL_ALIAS.to_string())
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Option<StopSequence>,
    #[serde(default)]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: Option<MessageContentOai>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContentOai {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContentOai {
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            Self::Text(_) => vec![],
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    pub r#type: String,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub index: Option<u32>,
    pub id: String,
    pub r#type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// List every known model id (Claude + Gemini), OpenAI-`/v1/models`-shaped.
pub fn list_models(created: i64) -> ModelsResponse {
    let data = CLAUDE_MODELS
        .iter()
        .chain(GEMINI_MODELS.iter())
        .map(|id| ModelInfo { id: id.to_string(), object: "model".to_string(), created, owned_by: "cloudcode-gateway".to_string() })
        .collect();
    ModelsResponse { object: "list".to_string(), data }
}

// ============================================================================
// Request conversion: OpenAI -> Anthropic
// ============================================================================

/// Convert an OpenAI chat request into the internal Anthropic-shaped
/// request. System messages are concatenated; assistant `tool_calls`
/// become `tool_use` blocks; `role: "tool"` messages become `user`
/// messages carrying a `tool_result` block.
pub fn convert_chat_request(request: &ChatRequest) -> MessagesRequest {
    let mut messages = Vec::new();
    let mut system: Option<SystemPrompt> = None;

    for msg in &request.messages {
        match msg.role {
            MessageRole::System => {
                let text = msg.content.as_ref().map(|c| c.as_text()).unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                system = Some(match system {
                    Some(SystemPrompt::Text(existing)) => SystemPrompt::Text(format!("{existing}\n{text}")),
                    _ => SystemPrompt::Text(text),
                });
            }
            MessageRole::User | MessageRole::Assistant | MessageRole::Tool => {
                let role = if msg.role == MessageRole::Assistant { Role::Assistant } else { Role::User };
                let mut blocks = Vec::new();

                if let Some(content) = &msg.content {
                    let text = content.as_text();
                    if !text.is_empty() {
                        blocks.push(ContentBlock::text(text));
                    }
                }

                if msg.role == MessageRole::Assistant {
                    if let Some(calls) = &msg.tool_calls {
                        for call in calls {
                            let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Object(Default::default()));
                            blocks.push(ContentBlock::tool_use(call.id.clone(), call.function.name.clone(), args));
                        }
                    }
                }

                if msg.role == MessageRole::Tool {
                    let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
                    let content_text = msg.content.as_ref().map(|c| c.as_text()).unwrap_or_default();
                    blocks.push(ContentBlock::tool_result(tool_use_id, content_text));
                }

                if !blocks.is_empty() {
                    messages.push(Message { role, content: MessageContent::Blocks(blocks) });
                }
            }
        }
    }

    let tools = request.tools.as_ref().and_then(|req_tools| {
        let tools: Vec<Tool> = req_tools
            .iter()
            .filter(|t| t.r#type == "function")
            .filter_map(|t| {
                t.function.parameters.as_ref().map(|params| {
                    Tool::new(t.function.name.clone(), t.function.description.clone().unwrap_or_default(), params.clone())
                })
            })
            .collect();
        if tools.is_empty() { None } else { Some(tools) }
    });

    let tool_choice = request.tool_choice.as_ref().and_then(|v| match v {
        Value::String(s) if s == "auto" => Some(ToolChoice::Auto),
        Value::String(s) if s == "none" => Some(ToolChoice::None),
        Value::String(s) if s == "required" => Some(ToolChoice::Any),
        Value::Object(obj) => obj
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(|n| n.as_str())
            .map(|name| ToolChoice::Tool { name: name.to_string() }),
        _ => None,
    });

    let model = resolve_model_alias(&request.model);

    MessagesRequest {
        model,
        messages,
        max_tokens: request.max_tokens.unwrap_or(4096),
        system,
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: None,
        stop_sequences: request.stop.clone().map(|s| match s {
            StopSequence::Single(v) => vec![v],
            StopSequence::Multiple(v) => v,
        }),
        tools,
        tool_choice,
        thinking: None,
        stream: Some(request.stream),
        metadata: None,
    }
}

// ============================================================================
// Response conversion: Anthropic -> OpenAI
// ============================================================================

/// Map an Anthropic stop reason to an OpenAI finish reason.
fn map_finish_reason(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence => "stop",
        StopReason::MaxTokens => "length",
        StopReason::ToolUse => "tool_calls",
    }
}

/// Convert an internal `MessagesResponse` into an OpenAI chat completion.
pub fn convert_chat_response(response: &MessagesResponse, created: i64) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in &response.content {
        if let Some(text) = block.as_text() {
            if !text.is_empty() {
                text_parts.push(text.to_string());
            }
        } else if let Some((id, name, input)) = block.as_tool_use() {
            tool_calls.push(ToolCall {
                index: Some(tool_calls.len() as u32),
                id: id.to_string(),
                r#type: "function".to_string(),
                function: FunctionCall { name: name.to_string(), arguments: serde_json::to_string(input).unwrap_or_default() },
            });
        }
    }

    let content = if text_parts.is_empty() { None } else { Some(text_parts.join("")) };
    let tool_calls = if tool_calls.is_empty() { None } else { Some(tool_calls) };

    let finish_reason = if tool_calls.is_some() {
        Some("tool_calls".to_string())
    } else {
        response.stop_reason.map(map_finish_reason).map(str::to_string)
    };

    ChatResponse {
        id: response.id.clone(),
        object: "chat.completion".to_string(),
        created,
        model: response.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage { role: "assistant".to_string(), content, tool_calls },
            finish_reason,
        }],
        usage: convert_usage(&response.usage),
    }
}

fn convert_usage(usage: &AnthropicUsage) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens(),
    }
}

// ============================================================================
// Streaming adapter: Anthropic StreamEvent -> OpenAI ChatChunk
// ============================================================================

/// Tracks state needed to reshape Anthropic SSE events into OpenAI chunks.
pub struct StreamAdapter {
    id: String,
    model: String,
    created: i64,
    emitted_role: bool,
    current_tool_index: Option<u32>,
    next_tool_index: u32,
}

impl StreamAdapter {
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: i64) -> Self {
        Self { id: id.into(), model: model.into(), created, emitted_role: false, current_tool_index: None, next_tool_index: 0 }
    }

    fn base_chunk(&self, delta: Delta, finish_reason: Option<String>) -> ChatChunk {
        ChatChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice { index: 0, delta, finish_reason }],
            usage: None,
        }
    }

    /// Convert one Anthropic stream event into zero or more OpenAI chunks.
    pub fn convert(&mut self, event: &StreamEvent) -> Vec<ChatChunk> {
        let mut chunks = Vec::new();

        match event {
            StreamEvent::MessageStart { .. } => {
                if !self.emitted_role {
                    self.emitted_role = true;
                    chunks.push(self.base_chunk(Delta { role: Some("assistant".to_string()), ..Default::default() }, None));
                }
            }
            StreamEvent::ContentBlockStart { content_block, .. } => {
                if let Some((id, name, _)) = content_block.as_tool_use() {
                    let index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.current_tool_index = Some(index);
                    chunks.push(self.base_chunk(
                        Delta {
                            tool_calls: Some(vec![ToolCall {
                                index: Some(index),
                                id: id.to_string(),
                                r#type: "function".to_string(),
                                function: FunctionCall { name: name.to_string(), arguments: String::new() },
                            }]),
                            ..Default::default()
                        },
                        None,
                    ));
                }
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                ContentDelta::TextDelta { text } => {
                    chunks.push(self.base_chunk(Delta { content: Some(text.clone()), ..Default::default() }, None));
                }
                ContentDelta::InputJsonDelta { partial_json } => {
                    if let Some(index) = self.current_tool_index {
                        chunks.push(self.base_chunk(
                            Delta {
                                tool_calls: Some(vec![ToolCall {
                                    index: Some(index),
                                    id: String::new(),
                                    r#type: "function".to_string(),
                                    function: FunctionCall { name: String::new(), arguments: partial_json.clone() },
                                }]),
                                ..Default::default()
                            },
                            None,
                        ));
                    }
                }
                ContentDelta::ThinkingDelta { .. } | ContentDelta::SignatureDelta { .. } => {}
            },
            StreamEvent::ContentBlockStop { .. } => {
                self.current_tool_index = None;
            }
            StreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.map(map_finish_reason).map(str::to_string);
                let mut chunk = self.base_chunk(Delta::default(), finish_reason);
                chunk.usage = usage.as_ref().map(convert_usage);
                chunks.push(chunk);
            }
            StreamEvent::MessageStop | StreamEvent::Ping | StreamEvent::Error { .. } => {}
        }

        chunks
    }
}
