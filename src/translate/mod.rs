//! Bidirectional wire-format translation: Anthropic Messages API <-> Google
//! `generateContent` schema, plus an OpenAI Chat Completions front door.
//!
//! Ported from `providers/gemini/models/*` (wire types) and
//! `providers/transform/gemini/*` (conversion logic).

pub mod anthropic;
pub mod content;
pub mod error;
pub mod google;
pub mod openai;
pub mod request;
pub mod response;
pub mod schema;
pub mod stream;

pub use anthropic::{
    CacheControl, ContentBlock, DocumentSource, ImageSource, Message, MessageContent,
    MessagesRequest, Role, SystemBlock, SystemPrompt, ThinkingConfig, Tool, ToolChoice,
    ToolResultContent,
};
pub use content::{convert_content_to_parts, convert_parts_to_content};
pub use error::{Result, TranslateError};
pub use google::{GoogleRequest, GoogleResponse};
pub use request::convert_request;
pub use response::{
    AnthropicModelInfo, AnthropicModelsResponse, MessagesResponse, StopReason, Usage,
    convert_response, list_models_anthropic,
};
pub use schema::sanitize_schema;
pub use stream::{ContentDelta, MessageDelta, PartialMessage, SseStream, StreamError, StreamEvent};

pub use openai::{
    ChatChunk, ChatRequest, ChatResponse, StreamAdapter, convert_chat_request,
    convert_chat_response, list_models, resolve_model_alias,
};
