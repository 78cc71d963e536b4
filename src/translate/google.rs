//! Google Generative AI wire types used by the Cloud Code API.
//!
//! Ported from `gemini/models/google.rs`. `UsageMetadata::effective_input_tokens`
//! is hardened with `saturating_sub` (the Open Question decision in §9):
//! a cached-token count observed larger than the prompt count must clamp
//! to zero, not underflow, and a `warn!` is emitted at the call site.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    pub contents: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GoogleThinkingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl GoogleRequest {
    pub fn new() -> Self {
        Self {
            contents: Vec::new(),
            generation_config: None,
            system_instruction: None,
            tools: None,
            tool_config: None,
            thinking_config: None,
            session_id: None,
        }
    }
}

impl Default for GoogleRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GoogleResponse {
    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn content(&self) -> Option<&Content> {
        self.first_candidate().and_then(|c| c.content.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_metadata: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts,
        }
    }

    pub fn system(parts: Vec<Part>) -> Self {
        Self { role: None, parts }
    }

    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_call: None,
            function_response: None,
            inline_data: None,
            thought: None,
            thought_signature: None,
            file_data: None,
        }
    }

    pub fn thought(text: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_call: None,
            function_response: None,
            inline_data: None,
            thought: Some(true),
            thought_signature: signature,
            file_data: None,
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            text: None,
            function_call: Some(call),
            function_response: None,
            inline_data: None,
            thought: None,
            thought_signature: None,
            file_data: None,
        }
    }

    pub fn function_response(response: FunctionResponse) -> Self {
        Self {
            text: None,
            function_call: None,
            function_response: Some(response),
            inline_data: None,
            thought: None,
            thought_signature: None,
            file_data: None,
        }
    }

    pub fn inline_data(data: InlineData) -> Self {
        Self {
            text: None,
            function_call: None,
            function_response: None,
            inline_data: Some(data),
            thought: None,
            thought_signature: None,
            file_data: None,
        }
    }

    pub fn file_data(data: FileData) -> Self {
        Self {
            text: None,
            function_call: None,
            function_response: None,
            inline_data: None,
            thought: None,
            thought_signature: None,
            file_data: Some(data),
        }
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some() && self.thought.is_none()
    }

    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }

    pub fn is_function_call(&self) -> bool {
        self.function_call.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
            id: None,
        }
    }

    pub fn with_id(name: impl Into<String>, args: Value, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            id: Some(id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub name: String,
    pub response: FunctionResponseData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FunctionResponse {
    pub fn with_id(name: impl Into<String>, content: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: FunctionResponseData {
                content: content.into(),
            },
            id: Some(id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponseData {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub file_uri: String,
}

impl FileData {
    pub fn new(file_uri: impl Into<String>) -> Self {
        Self {
            mime_type: None,
            file_uri: file_uri.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GenerationConfig {
    pub fn new(max_output_tokens: u32) -> Self {
        Self {
            max_output_tokens: Some(max_output_tokens),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

impl GoogleTool {
    pub fn new(declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations: declarations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, description: Option<String>, parameters: Option<Value>) -> Self {
        Self {
            name: name.into(),
            description,
            parameters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub function_calling_config: FunctionCallingConfig,
}

impl ToolConfig {
    pub fn auto() -> Self {
        Self {
            function_calling_config: FunctionCallingConfig {
                mode: "AUTO".to_string(),
                allowed_function_names: None,
            },
        }
    }

    pub fn validated() -> Self {
        Self {
            function_calling_config: FunctionCallingConfig {
                mode: "VALIDATED".to_string(),
                allowed_function_names: None,
            },
        }
    }

    pub fn any() -> Self {
        Self {
            function_calling_config: FunctionCallingConfig {
                mode: "ANY".to_string(),
                allowed_function_names: None,
            },
        }
    }

    pub fn none() -> Self {
        Self {
            function_calling_config: FunctionCallingConfig {
                mode: "NONE".to_string(),
                allowed_function_names: None,
            },
        }
    }

    pub fn force(function_name: impl Into<String>) -> Self {
        Self {
            function_calling_config: FunctionCallingConfig {
                mode: "ANY".to_string(),
                allowed_function_names: Some(vec![function_name.into()]),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleThinkingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_thoughts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl GoogleThinkingConfig {
    pub fn gemini(thinking_budget: u32) -> Self {
        Self {
            include_thoughts: Some(true),
            thinking_budget: Some(thinking_budget),
            budget_tokens: None,
        }
    }

    pub fn claude(budget_tokens: u32) -> Self {
        Self {
            include_thoughts: None,
            thinking_budget: None,
            budget_tokens: Some(budget_tokens),
        }
    }
}

/// Token counts are `i64` rather than `u32` because upstream has been
/// observed to send negative counts on degraded responses; deserializing
/// into an unsigned type would reject the whole response before
/// `effective_input_tokens` ever gets a chance to clamp it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: i64,
    #[serde(default)]
    pub candidates_token_count: i64,
    #[serde(default)]
    pub total_token_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<i64>,
}

impl UsageMetadata {
    /// Input tokens billed, excluding cache hits. Clamped to zero rather
    /// than underflowing (or panicking on a negative upstream count) if a
    /// cache count is observed larger than the prompt count.
    pub fn effective_input_tokens(&self) -> u32 {
        let prompt = self.prompt_token_count.max(0) as u32;
        let cached = self.cached_content_token_count.unwrap_or(0).max(0) as u32;
        prompt.saturating_sub(cached)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCodeWrapper {
    pub project: String,
    pub model: String,
    pub request: GoogleRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CloudCodeWrapper {
    pub fn new(project: impl Into<String>, model: impl Into<String>, request: GoogleRequest) -> Self {
        Self {
            project: project.into(),
            model: model.into(),
            request,
            user_agent: Some("antigravity".to_string()),
            request_type: Some("agent".to_string()),
            request_id: None,
        }
    }
}
