//! Anthropic response types and Google -> Anthropic response conversion.
//!
//! Ported from `providers/gemini/models/response.rs` (types) and
//! `providers/transform/gemini/response.rs` (`convert_response`).
//!
//! Finish reason mapping: `STOP -> end_turn`, `MAX_TOKENS -> max_tokens`,
//! `TOOL_USE -> tool_use`, `SAFETY`/`RECITATION`/`OTHER -> end_turn`, no
//! finish reason but a function call present -> `tool_use`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::anthropic::{ContentBlock, Role};
use super::content::convert_parts_to_content;
use super::google::GoogleResponse;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub response_type: String,
    pub model: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

fn default_message_type() -> String {
    "message".to_string()
}

impl MessagesResponse {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Vec<ContentBlock>,
        stop_reason: Option<StopReason>,
        usage: Usage,
    ) -> Self {
        Self {
            id: id.into(),
            response_type: "message".to_string(),
            model: model.into(),
            role: Role::Assistant,
            content,
            stop_reason,
            stop_sequence: None,
            usage,
        }
    }

    pub fn text(&self) -> String {
        self.content.iter().filter_map(|block| block.as_text()).collect::<Vec<_>>().join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content.iter().filter(|block| block.is_tool_use())
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(|block| block.is_tool_use())
    }

    pub fn has_thinking(&self) -> bool {
        self.content.iter().any(|block| block.is_thinking())
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self.stop_reason, Some(StopReason::MaxTokens))
    }

    pub fn wants_tool_use(&self) -> bool {
        matches!(self.stop_reason, Some(StopReason::ToolUse))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
            StopReason::ToolUse => write!(f, "tool_use"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u32>,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self { input_tokens, output_tokens, cache_creation_input_tokens: None, cache_read_input_tokens: None }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Effective input tokens, excluding cache reads. Clamped to zero
    /// (see `UsageMetadata::effective_input_tokens` on the Google side).
    pub fn effective_input_tokens(&self) -> u32 {
        self.input_tokens.saturating_sub(self.cache_read_input_tokens.unwrap_or(0))
    }
}

/// Convert a Google `GoogleResponse` into an Anthropic `MessagesResponse`.
pub fn convert_response(response: &GoogleResponse, model: &str) -> MessagesResponse {
    let candidate = response.candidates.first();

    let parts = candidate.and_then(|c| c.content.as_ref()).map(|content| content.parts.as_slice()).unwrap_or(&[]);

    let mut content = convert_parts_to_content(parts, model);
    if content.is_empty() {
        content.push(ContentBlock::text(""));
    }

    let finish_reason = candidate.and_then(|c| c.finish_reason.as_deref());
    let has_tool_calls = content.iter().any(|b| b.is_tool_use());
    let stop_reason = determine_stop_reason(finish_reason, has_tool_calls);

    let usage = extract_usage(response);
    let id = generate_message_id();

    MessagesResponse {
        id,
        response_type: "message".to_string(),
        role: Role::Assistant,
        content,
        model: model.to_string(),
        stop_reason,
        stop_sequence: None,
        usage,
    }
}

/// Mirrors `stream::map_finish_reason`: an unrecognized `finishReason`
/// (e.g. `OTHER`) maps to `None` rather than defaulting to `EndTurn`, so the
/// streaming and non-streaming paths agree on what "unmapped" means.
fn determine_stop_reason(finish_reason: Option<&str>, has_tool_calls: bool) -> Option<StopReason> {
    match finish_reason {
        Some("STOP") => Some(StopReason::EndTurn),
        Some("MAX_TOKENS") => Some(StopReason::MaxTokens),
        Some("TOOL_USE") => Some(StopReason::ToolUse),
        Some("SAFETY") | Some("RECITATION") => Some(StopReason::EndTurn),
        Some(_) => None,
        None if has_tool_calls => Some(StopReason::ToolUse),
        None => None,
    }
}

fn extract_usage(response: &GoogleResponse) -> Usage {
    let metadata = response.usage_metadata.as_ref();

    let prompt_tokens = metadata.map(|m| m.prompt_token_count).unwrap_or(0).max(0) as u32;
    let cached_tokens =
        metadata.and_then(|m| m.cached_content_token_count).unwrap_or(0).max(0) as u32;
    let output_tokens = metadata.map(|m| m.candidates_token_count).unwrap_or(0).max(0) as u32;

    if cached_tokens > prompt_tokens {
        warn!(
            prompt_tokens,
            cached_tokens, "cachedContentTokenCount exceeds promptTokenCount, clamping input_tokens to 0"
        );
    }
    let input_tokens = prompt_tokens.saturating_sub(cached_tokens);

    Usage {
        input_tokens,
        output_tokens,
        cache_read_input_tokens: if cached_tokens > 0 { Some(cached_tokens) } else { None },
        cache_creation_input_tokens: None,
    }
}

fn generate_message_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("msg_{:032x}", timestamp)
}

/// `GET /v1/models` response, Anthropic-shaped (`type`/`display_name`/
/// `created_at` rather than OpenAI's `object`/`owned_by`/`created`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnthropicModelsResponse {
    pub data: Vec<AnthropicModelInfo>,
    pub has_more: bool,
    #[serde(rename = "first_id", skip_serializing_if = "Option::is_none")]
    pub first_id: Option<String>,
    #[serde(rename = "last_id", skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnthropicModelInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub display_name: String,
    pub created_at: String,
}

/// List every known Claude/Gemini model id in the Anthropic `/v1/models`
/// shape. `created_at` is caller-supplied (an RFC3339 string, per
/// Anthropic's own listing format) rather than computed here, since this
/// crate has no other use for a datetime-formatting dependency.
pub fn list_models_anthropic(created_at: impl Into<String>) -> AnthropicModelsResponse {
    let created_at = created_at.into();
    let data: Vec<AnthropicModelInfo> = crate::dispatch::constants::CLAUDE_MODELS
        .iter()
        .chain(crate::dispatch::constants::GEMINI_MODELS.iter())
        .map(|id| AnthropicModelInfo {
            id: id.to_string(),
            model_type: "model".to_string(),
            display_name: id.to_string(),
            created_at: created_at.clone(),
        })
        .collect();

    let first_id = data.first().map(|m| m.id.clone());
    let last_id = data.last().map(|m| m.id.clone());

    AnthropicModelsResponse { data, has_more: false, first_id, last_id }
}
