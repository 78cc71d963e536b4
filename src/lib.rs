//! cloudcode-gateway core: pools Google Cloud Code (Antigravity) accounts
//! and serves their capacity through the Anthropic Messages API and the
//! OpenAI Chat Completions API.
//!
//! This crate is a library, not a server. The HTTP surface named in the
//! spec -- `POST /v1/messages`, `POST /v1/chat/completions`,
//! `GET /v1/models` -- is a collaborator's concern: binding a socket,
//! parsing frames, and enforcing whatever auth policy it wants. This crate
//! supplies [`handle_messages`], [`handle_messages_stream`],
//! [`handle_chat_completions`], [`handle_chat_completions_stream`] and
//! [`list_models`] as the thin shims a listener calls into; none of them
//! touch a socket.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod thinking;
pub mod translate;

use std::pin::Pin;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::{Stream, StreamExt};

use crate::auth::CredentialBroker;
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::pool::AccountPool;
use crate::translate::openai::{ChatChunk, ChatRequest, ChatResponse, StreamAdapter};
use crate::translate::{AnthropicModelsResponse, MessagesRequest, MessagesResponse, StreamEvent};

pub use error::{GatewayError, Result};

/// Everything a request needs to reach an upstream account: the pool, the
/// credential broker, and the dispatcher built on top of them. Constructed
/// once per process and shared behind an `Arc` by the collaborator.
pub struct GatewayCore {
    pool: Arc<AccountPool>,
    dispatcher: Arc<Dispatcher>,
}

impl GatewayCore {
    /// Build a core from configuration: loads the persisted account pool
    /// file and wires up the credential broker and dispatcher on top of it.
    pub async fn new(config: &GatewayConfig, http: reqwest::Client) -> Result<Self> {
        let pool = Arc::new(AccountPool::initialize(config.pool.accounts_path.clone()).await?);
        let broker = Arc::new(CredentialBroker::new(http.clone(), config.oauth.to_oauth_config()));
        let dispatcher = Arc::new(Dispatcher::new(pool.clone(), broker, http));
        Ok(Self { pool, dispatcher })
    }

    /// Build a core from already-constructed parts, for collaborators that
    /// manage the pool or broker lifecycle themselves (e.g. a db-backed
    /// pool whose accounts are resolved outside this crate).
    pub fn from_parts(pool: Arc<AccountPool>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    pub fn pool(&self) -> &Arc<AccountPool> {
        &self.pool
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// `POST /v1/messages`, non-streaming: drive the core and return the
/// assembled Anthropic response.
pub async fn handle_messages(core: &GatewayCore, request: &MessagesRequest) -> Result<MessagesResponse> {
    Ok(core.dispatcher.send(request).await?)
}

/// A stream of Anthropic-shaped stream events, erased behind a trait
/// object so callers don't need to name the dispatcher's internal byte
/// stream type.
pub type MessageEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// `POST /v1/messages` with `stream: true`: drive the core and return the
/// Anthropic SSE event sequence.
pub async fn handle_messages_stream(
    core: &GatewayCore,
    request: &MessagesRequest,
) -> Result<MessageEventStream> {
    let events = core.dispatcher.send_stream(request).await?;
    Ok(Box::pin(events.map(|r| r.map_err(GatewayError::from))))
}

/// `POST /v1/chat/completions`, non-streaming: normalize to the internal
/// Anthropic-shaped request, drive the core, and reshape the response back
/// into OpenAI's wire format.
pub async fn handle_chat_completions(core: &GatewayCore, request: &ChatRequest) -> Result<ChatResponse> {
    let anthropic_request = translate::convert_chat_request(request);
    let response = handle_messages(core, &anthropic_request).await?;
    Ok(translate::convert_chat_response(&response, now_unix()))
}

pub type ChatChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// `POST /v1/chat/completions` with `stream: true`: drive the core and
/// reshape the Anthropic event sequence into OpenAI chunks as it arrives.
/// A translation error surfaces as a single `Err` item and ends the
/// stream; no partial chunk is ever emitted for it.
pub async fn handle_chat_completions_stream(
    core: &GatewayCore,
    request: &ChatRequest,
) -> Result<ChatChunkStream> {
    let anthropic_request = translate::convert_chat_request(request);
    let model = anthropic_request.model.clone();
    let created = now_unix();
    let chat_id = format!("chatcmpl-{}", uuid::Uuid::new_v4());

    let events = handle_messages_stream(core, &anthropic_request).await?;
    let mut adapter = StreamAdapter::new(chat_id, model, created);

    let chunks = events.flat_map(move |event| {
        let items: Vec<Result<ChatChunk>> = match event {
            Ok(ev) => adapter.convert(&ev).into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        futures::stream::iter(items)
    });

    Ok(Box::pin(chunks))
}

/// `GET /v1/models`: the known Claude/Gemini model ids this gateway can
/// serve, in the Anthropic `/v1/models` response shape. Synthesized from
/// the static tables in [`dispatch::constants`] rather than a live
/// `fetchAvailableModels` call against an account, since the set of models
/// Cloud Code offers is effectively fixed and doesn't warrant spending a
/// pool slot on every listing request. `created_at` is a fixed placeholder
/// rather than "now", since these entries describe a static synthesized
/// catalog, not freshly-created resources.
pub fn list_models() -> AnthropicModelsResponse {
    translate::list_models_anthropic("2024-01-01T00:00:00Z")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Account, AccountSource};
    use crate::translate::openai::{ChatMessage, MessageContentOai, MessageRole};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn core_against(mock_uri: &str) -> GatewayCore {
        let mut account = Account::new(
            "a@x.com",
            AccountSource::ApiKey {
                api_key: "key-a".to_string(),
            },
        );
        account.project_id = Some("test-project".to_string());

        let pool = Arc::new(AccountPool::new_in_memory(vec![account]));
        let broker = Arc::new(CredentialBroker::with_default_oauth_config(reqwest::Client::new()));
        let dispatcher = Arc::new(
            Dispatcher::new(pool.clone(), broker, reqwest::Client::new())
                .with_endpoint_override(mock_uri),
        );
        GatewayCore::from_parts(pool, dispatcher)
    }

    fn chat_request(model: &str, text: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: MessageRole::User,
                content: Some(MessageContentOai::Text(text.to_string())),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            }],
            temperature: None,
            max_tokens: None,
            stream: false,
            top_p: None,
            stop: None,
            tools: None,
            tool_choice: None,
        }
    }

    #[tokio::test]
    async fn test_handle_chat_completions_round_trips_through_messages() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "hi there"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}
            })))
            .mount(&mock_server)
            .await;

        let core = core_against(&mock_server.uri()).await;
        let request = chat_request("claude-sonnet-4-5", "hello");

        let response = handle_chat_completions(&core, &request).await.unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hi there"));
        assert_eq!(response.usage.total_tokens, 6);
    }

    #[test]
    fn test_list_models_includes_known_families() {
        let models = list_models();
        assert!(!models.data.is_empty());
    }
}
