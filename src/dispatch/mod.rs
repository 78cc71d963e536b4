//! Upstream dispatcher: turns an Anthropic-shaped request into a reply by
//! picking an account from the pool, wrapping the translated request in
//! Cloud Code's envelope, and POSTing it with endpoint and account failover.
//!
//! Grounded on `providers/gemini/client.rs`'s `CloudCodeClient` for the
//! wrapping/header/status-handling shape and `providers/gemini/transport/http.rs`
//! for the endpoint-fallback loop. Neither teacher type has a concept of
//! multiple accounts, so the account-level retry loop here is new -- but it
//! follows the same "try, classify, continue-or-return" shape as
//! `ProviderRouter`'s provider-level dispatch and `http.rs`'s endpoint loop.

pub mod constants;
pub mod error;
pub mod ratelimit;

use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::{FutureExt, Stream, StreamExt};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::auth::CredentialBroker;
use crate::pool::{Account, AccountPool, Pick};
use crate::translate::{
    self, ContentBlock, ContentDelta, MessagesRequest, MessagesResponse, Role, SseStream,
    StopReason, StreamEvent, Usage,
};
use crate::translate::google::{CloudCodeWrapper, Content, GoogleResponse, Part};

pub use error::{DispatchError, RateLimitHint, Result};

use constants::{
    is_thinking_model, model_fallback, ANTIGRAVITY_SYSTEM_INSTRUCTION, API_PATH_GENERATE_CONTENT,
    API_PATH_STREAM_GENERATE_CONTENT, CLIENT_METADATA, CLOUDCODE_ENDPOINT_FALLBACKS,
    GOOG_API_CLIENT, MAX_RETRIES, ModelFamily, USER_AGENT, get_model_family,
};

type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Dispatches Anthropic-shaped requests against the Cloud Code backend
/// through a pool of Google accounts.
pub struct Dispatcher {
    pool: std::sync::Arc<AccountPool>,
    broker: std::sync::Arc<CredentialBroker>,
    http: reqwest::Client,
    /// Override for `CLOUDCODE_ENDPOINT_FALLBACKS`, set only in tests.
    endpoint_override: Option<Vec<String>>,
}

/// Outcome of one POST attempt, classified by status.
enum AttemptOutcome {
    Response(reqwest::Response),
    /// 401: token rejected, caller should invalidate and retry another account.
    Unauthorized,
    /// 429: rate limited, with a parsed reset hint.
    RateLimited(RateLimitHint),
    /// 5xx: transient upstream failure.
    ServerError,
    /// Any other non-success status: not worth retrying.
    Fatal { status: u16, body: String },
}

impl Dispatcher {
    pub fn new(
        pool: std::sync::Arc<AccountPool>,
        broker: std::sync::Arc<CredentialBroker>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            pool,
            broker,
            http,
            endpoint_override: None,
        }
    }

    /// Override the Cloud Code endpoint list with a single URL, for tests.
    #[cfg(test)]
    pub(crate) fn with_endpoint_override(mut self, url: impl Into<String>) -> Self {
        self.endpoint_override = Some(vec![url.into()]);
        self
    }

    fn endpoints(&self) -> Vec<&str> {
        match &self.endpoint_override {
            Some(urls) => urls.iter().map(String::as_str).collect(),
            None => CLOUDCODE_ENDPOINT_FALLBACKS.to_vec(),
        }
    }

    /// Send a Messages API request and return the assembled response.
    ///
    /// For thinking models this internally drives the streaming endpoint and
    /// accumulates the resulting events, since Cloud Code only emits
    /// thought signatures over SSE.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        self.send_with_fallback(request, true).await
    }

    async fn send_with_fallback(
        &self,
        request: &MessagesRequest,
        fallback: bool,
    ) -> Result<MessagesResponse> {
        let model = request.model.clone();

        if is_thinking_model(&model) {
            let response = self
                .run_retry_loop(&model, request, true, fallback)
                .await?;
            let byte_stream = response.bytes_stream();
            let sse = SseStream::new(byte_stream, model.clone());
            return accumulate_stream(sse).await;
        }

        let response = self
            .run_retry_loop(&model, request, false, fallback)
            .await?;
        let body = response.text().await?;
        let google_response = parse_google_response(&body);
        Ok(translate::convert_response(&google_response, &model))
    }

    /// Send a Messages API request and return a stream of Anthropic SSE
    /// events. Thinking and non-thinking models both stream directly --
    /// there is no internal accumulation here.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn send_stream(
        &self,
        request: &MessagesRequest,
    ) -> Result<SseStream<ByteStream>> {
        let model = request.model.clone();
        let response = self.run_retry_loop(&model, request, true, true).await?;
        let byte_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(SseStream::new(byte_stream, model))
    }

    /// The account-failover retry loop described in §4.4: pick a sticky
    /// account, POST with endpoint fallback, classify the result, and
    /// advance to the next account on anything retryable.
    async fn run_retry_loop(
        &self,
        model: &str,
        request: &MessagesRequest,
        streaming: bool,
        fallback: bool,
    ) -> Result<reqwest::Response> {
        let account_count = self.pool.accounts().await.len().max(1);
        let max_attempts = MAX_RETRIES.max(account_count as u32 + 1);

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let account = match self.pool.pick_sticky(model).await? {
                Pick::Account(account) => account,
                Pick::Wait(wait_ms) => {
                    debug!(wait_ms, "all accounts cooling down, sleeping briefly");
                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                    continue;
                }
            };

            if !account.is_usable_for(model) {
                // pick_sticky advanced past budget anyway so callers observe
                // rotation; surface the wait-for-all error here instead.
                let min_wait_ms = self.pool.get_min_wait_time_ms(model).await;
                return self
                    .maybe_fallback(model, request, streaming, fallback, min_wait_ms)
                    .await;
            }

            let token = match self.broker.get_token_for_account(&account).await {
                Ok(token) => token,
                Err(e) => {
                    if e.is_permanent() {
                        warn!(email = %account.email, error = %e, "permanent credential failure, marking account invalid");
                        self.pool.mark_invalid(&account.email, e.to_string()).await;
                    } else {
                        warn!(email = %account.email, error = %e, "transient credential error, failing over to another account");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }

                    if attempt >= max_attempts {
                        let min_wait_ms = self.pool.get_min_wait_time_ms(model).await;
                        return self
                            .maybe_fallback(model, request, streaming, fallback, min_wait_ms)
                            .await;
                    }
                    continue;
                }
            };
            let project_id = self.broker.get_project_for_account(&account, &token).await;

            let google_request = translate::convert_request(request);
            let wrapped = self.wrap_request(&project_id, model, google_request);

            let path = if streaming {
                API_PATH_STREAM_GENERATE_CONTENT
            } else {
                API_PATH_GENERATE_CONTENT
            };

            match self
                .post_with_fallback(path, &token, &wrapped, model, streaming)
                .await
            {
                Ok(AttemptOutcome::Response(response)) => return Ok(response),
                Ok(AttemptOutcome::Unauthorized) => {
                    self.broker.invalidate_token(&account.email).await;
                    self.broker.invalidate_project(&account.email).await;
                }
                Ok(AttemptOutcome::RateLimited(hint)) => {
                    // `hint.reset_in_ms` is a duration from now; the pool
                    // stores an absolute epoch-ms deadline.
                    let reset_at = hint.reset_in_ms.map(|ms| now_ms() + ms);
                    self.pool
                        .mark_rate_limited(&account.email, reset_at, model)
                        .await;
                }
                Ok(AttemptOutcome::ServerError) => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok(AttemptOutcome::Fatal { status, body }) => {
                    return Err(DispatchError::Fatal { status, body });
                }
                Err(DispatchError::Network(e)) => {
                    warn!(error = %e, email = %account.email, "network error talking to upstream");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(other) => return Err(other),
            }

            if attempt >= max_attempts {
                let min_wait_ms = self.pool.get_min_wait_time_ms(model).await;
                return self
                    .maybe_fallback(model, request, streaming, fallback, min_wait_ms)
                    .await;
            }
        }
    }

    /// Once accounts are exhausted, recurse once into a configured cheaper
    /// fallback model before surfacing `AllRateLimited`.
    async fn maybe_fallback(
        &self,
        model: &str,
        request: &MessagesRequest,
        streaming: bool,
        fallback: bool,
        min_wait_ms: Option<u64>,
    ) -> Result<reqwest::Response> {
        if fallback {
            if let Some(fallback_model) = model_fallback(model) {
                debug!(model, fallback_model, "exhausted accounts, falling back to cheaper model");
                let mut fallback_request = request.clone();
                fallback_request.model = fallback_model.to_string();
                return self
                    .run_retry_loop(fallback_model, &fallback_request, streaming, false)
                    .boxed()
                    .await;
            }
        }

        Err(DispatchError::AllRateLimited {
            min_wait_ms: min_wait_ms.unwrap_or(0),
        })
    }

    /// POST the wrapped request with endpoint fallback, classifying the
    /// response (or error) into an `AttemptOutcome`.
    async fn post_with_fallback(
        &self,
        path: &str,
        token: &str,
        body: &CloudCodeWrapper,
        model: &str,
        streaming: bool,
    ) -> Result<AttemptOutcome> {
        let headers = Self::build_headers(token, model, streaming);
        let mut best_rate_limit: Option<RateLimitHint> = None;
        let mut last_network_error: Option<reqwest::Error> = None;

        let endpoints = self.endpoints();
        for (idx, endpoint) in endpoints.iter().enumerate() {
            let url = format!("{endpoint}{path}");
            let is_last = idx == endpoints.len() - 1;

            let sent = self
                .http
                .post(&url)
                .headers(headers.clone())
                .json(body)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    if !is_last {
                        last_network_error = Some(e);
                        continue;
                    }
                    return Err(DispatchError::Network(e));
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(AttemptOutcome::Response(response));
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match status {
                StatusCode::UNAUTHORIZED => {
                    if is_last {
                        return Ok(AttemptOutcome::Unauthorized);
                    }
                    debug!(endpoint, "endpoint returned 401, trying next endpoint");
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let body_text = response.text().await.unwrap_or_default();
                    let hint = ratelimit::parse_rate_limit_hint(&body_text, retry_after.as_deref());
                    best_rate_limit = Some(merge_rate_limit_hint(best_rate_limit, hint));
                    if is_last {
                        return Ok(AttemptOutcome::RateLimited(
                            best_rate_limit.unwrap_or_default(),
                        ));
                    }
                }
                StatusCode::FORBIDDEN | StatusCode::NOT_FOUND if !is_last => {
                    debug!(endpoint, status = %status, "endpoint rejected request, trying fallback");
                }
                s if s.is_server_error() => {
                    if is_last {
                        return Ok(AttemptOutcome::ServerError);
                    }
                }
                other => {
                    let body_text = response.text().await.unwrap_or_default();
                    return Ok(AttemptOutcome::Fatal {
                        status: other.as_u16(),
                        body: body_text,
                    });
                }
            }
        }

        if let Some(e) = last_network_error {
            return Err(DispatchError::Network(e));
        }
        Ok(AttemptOutcome::ServerError)
    }

    fn build_headers(token: &str, model: &str, streaming: bool) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();

        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        headers.insert(reqwest::header::USER_AGENT, USER_AGENT.parse().unwrap());
        headers.insert(
            reqwest::header::HeaderName::from_static("x-goog-api-client"),
            GOOG_API_CLIENT.parse().unwrap(),
        );
        headers.insert(
            reqwest::header::HeaderName::from_static("client-metadata"),
            CLIENT_METADATA.parse().unwrap(),
        );

        if get_model_family(model) == ModelFamily::Claude && is_thinking_model(model) {
            headers.insert(
                reqwest::header::HeaderName::from_static("anthropic-beta"),
                "interleaved-thinking-2025-05-14".parse().unwrap(),
            );
        }

        if streaming {
            headers.insert(
                reqwest::header::ACCEPT,
                "text/event-stream".parse().unwrap(),
            );
        }

        headers
    }

    /// Wrap a translated Google request in Cloud Code's envelope, deriving
    /// a stable session id and prepending the Antigravity system persona.
    fn wrap_request(
        &self,
        project_id: &str,
        model: &str,
        mut request: crate::translate::google::GoogleRequest,
    ) -> CloudCodeWrapper {
        request.session_id = Some(derive_session_id(&request));

        let mut system_parts = vec![Part::text(ANTIGRAVITY_SYSTEM_INSTRUCTION)];
        if let Some(sys) = &request.system_instruction {
            for part in &sys.parts {
                if let Some(text) = &part.text {
                    system_parts.push(Part::text(text));
                }
            }
        }
        request.system_instruction = Some(Content {
            role: Some("user".to_string()),
            parts: system_parts,
        });

        let mut wrapper = CloudCodeWrapper::new(project_id, model, request);
        wrapper.request_id = Some(generate_request_id());
        wrapper
    }
}

/// Keep the smallest known reset hint across endpoints; a hint with no
/// parsed reset time loses to one that has an actual value.
fn merge_rate_limit_hint(current: Option<RateLimitHint>, new: RateLimitHint) -> RateLimitHint {
    match (current, new.reset_in_ms) {
        (Some(prev), _) if prev.reset_in_ms.is_some() && new.reset_in_ms.is_none() => prev,
        (Some(prev), Some(new_ms)) => {
            let prev_ms = prev.reset_in_ms.unwrap_or(u64::MAX);
            if prev_ms <= new_ms { prev } else { new }
        }
        _ => new,
    }
}

fn derive_session_id(request: &crate::translate::google::GoogleRequest) -> String {
    let first_user_content = request
        .contents
        .iter()
        .find(|c| c.role.as_deref() == Some("user"))
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(first_user_content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_request_id() -> String {
    format!("agent-{}", uuid::Uuid::new_v4())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Parse a non-streaming `generateContent` body, degrading gracefully to an
/// empty response instead of failing the whole request if upstream sent
/// something the wire types can't represent (per §7: a malformed response
/// must never abort the request).
fn parse_google_response(body: &str) -> GoogleResponse {
    serde_json::from_str(body).unwrap_or_else(|e| {
        let err = crate::translate::error::TranslateError::MalformedResponse(e.to_string());
        warn!(
            error = %err,
            body = %body.chars().take(200).collect::<String>(),
            "malformed upstream response, synthesizing empty reply"
        );
        GoogleResponse {
            candidates: Vec::new(),
            usage_metadata: None,
            model_version: None,
        }
    })
}

/// Drain an internal SSE stream (used for thinking-model non-streaming
/// requests) into a single assembled `MessagesResponse`.
async fn accumulate_stream<S>(mut stream: SseStream<S>) -> Result<MessagesResponse>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let mut id = String::new();
    let mut model = String::new();
    let mut content: Vec<ContentBlock> = Vec::new();
    let mut stop_reason: Option<StopReason> = None;
    let mut usage = Usage::default();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::MessageStart { message } => {
                id = message.id;
                model = message.model;
                if let Some(u) = message.usage {
                    usage = u;
                }
            }
            StreamEvent::ContentBlockStart { index, content_block } => {
                if content.len() <= index {
                    content.resize(index + 1, ContentBlock::text(""));
                }
                content[index] = content_block;
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                if let Some(block) = content.get_mut(index) {
                    apply_delta(block, delta);
                }
            }
            StreamEvent::ContentBlockStop { .. } => {}
            StreamEvent::MessageDelta { delta, usage: delta_usage } => {
                if delta.stop_reason.is_some() {
                    stop_reason = delta.stop_reason;
                }
                if let Some(u) = delta_usage {
                    usage = u;
                }
            }
            StreamEvent::MessageStop => break,
            StreamEvent::Ping | StreamEvent::Error { .. } => {}
        }
    }

    Ok(MessagesResponse::new(id, model, content, stop_reason, usage))
}

fn apply_delta(block: &mut ContentBlock, delta: ContentDelta) {
    match (block, delta) {
        (ContentBlock::Text { text }, ContentDelta::TextDelta { text: delta_text }) => {
            text.push_str(&delta_text);
        }
        (ContentBlock::Thinking { thinking, .. }, ContentDelta::ThinkingDelta { thinking: delta_text }) => {
            thinking.push_str(&delta_text);
        }
        (ContentBlock::Thinking { signature, .. }, ContentDelta::SignatureDelta { signature: sig }) => {
            *signature = Some(sig);
        }
        (ContentBlock::ToolUse { input, .. }, ContentDelta::InputJsonDelta { partial_json }) => {
            // Partial JSON fragments accumulate as a string under a
            // sentinel key until the block closes; the translator only
            // reads the final parsed value produced by `convert_response`
            // in the non-accumulated path, so here we just append text and
            // leave well-formed objects (the common single-chunk case)
            // alone.
            if let Some(existing) = input.as_str() {
                *input = serde_json::Value::String(format!("{existing}{partial_json}"));
            } else if input.is_null() {
                *input = serde_json::Value::String(partial_json);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::AccountSource;
    use crate::translate::Message;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher_against(pool: AccountPool, mock_uri: &str) -> Dispatcher {
        let broker = CredentialBroker::with_default_oauth_config(reqwest::Client::new());
        Dispatcher::new(
            std::sync::Arc::new(pool),
            std::sync::Arc::new(broker),
            reqwest::Client::new(),
        )
        .with_endpoint_override(mock_uri)
    }

    fn api_key_account(email: &str, key: &str) -> Account {
        let mut account = Account::new(
            email,
            AccountSource::ApiKey {
                api_key: key.to_string(),
            },
        );
        // Pin the project id so tests never fall through to real discovery
        // against the hardcoded Google endpoints.
        account.project_id = Some("test-project".to_string());
        account
    }

    fn request(model: &str) -> MessagesRequest {
        MessagesRequest {
            model: model.to_string(),
            messages: vec![Message::user("hello")],
            max_tokens: 1024,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: None,
            metadata: None,
        }
    }

    fn generate_content_ok_body() -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "hi"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1}
        })
    }

    #[test]
    fn test_derive_session_id_is_stable() {
        let req = crate::translate::google::GoogleRequest {
            contents: vec![Content::user(vec![Part::text("hi there")])],
            ..crate::translate::google::GoogleRequest::new()
        };
        let a = derive_session_id(&req);
        let b = derive_session_id(&req);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_build_headers_thinking_model_gets_anthropic_beta() {
        let headers = Dispatcher::build_headers("tok", "claude-sonnet-4-5-thinking", false);
        assert!(headers.contains_key("anthropic-beta"));
    }

    #[test]
    fn test_build_headers_non_thinking_model_has_no_anthropic_beta() {
        let headers = Dispatcher::build_headers("tok", "claude-sonnet-4-5", false);
        assert!(!headers.contains_key("anthropic-beta"));
    }

    #[tokio::test]
    async fn test_send_happy_path_non_thinking_model() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_content_ok_body()))
            .mount(&mock_server)
            .await;

        let pool = AccountPool::new_in_memory(vec![api_key_account("a@x.com", "key-a")]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let response = dispatcher.send(&request("claude-sonnet-4-5")).await.unwrap();
        assert_eq!(response.text(), "hi");
        assert_eq!(response.usage.output_tokens, 1);
    }

    #[test]
    fn test_parse_google_response_degrades_gracefully_on_malformed_body() {
        let response = parse_google_response("not json at all");
        assert!(response.candidates.is_empty());
        assert!(response.usage_metadata.is_none());
    }

    #[tokio::test]
    async fn test_malformed_upstream_body_yields_placeholder_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not valid json"))
            .mount(&mock_server)
            .await;

        let pool = AccountPool::new_in_memory(vec![api_key_account("a@x.com", "key-a")]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let response = dispatcher.send(&request("claude-sonnet-4-5")).await.unwrap();
        assert_eq!(response.content.len(), 1);
        assert!(response.content[0].is_text());
    }

    #[tokio::test]
    async fn test_401_invalidates_token_and_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_content_ok_body()))
            .mount(&mock_server)
            .await;

        let pool = AccountPool::new_in_memory(vec![
            api_key_account("a@x.com", "key-a"),
            api_key_account("b@x.com", "key-b"),
        ]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let response = dispatcher.send(&request("claude-sonnet-4-5")).await.unwrap();
        assert_eq!(response.text(), "hi");
    }

    #[tokio::test]
    async fn test_permanent_credential_failure_marks_invalid_and_fails_over() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_content_ok_body()))
            .mount(&mock_server)
            .await;

        let unresolvable = Account::new(
            "db@x.com",
            AccountSource::DbBacked {
                reference: "accounts.db#1".to_string(),
            },
        );
        let pool = AccountPool::new_in_memory(vec![unresolvable, api_key_account("a@x.com", "key-a")]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let response = dispatcher.send(&request("claude-sonnet-4-5")).await.unwrap();
        assert_eq!(response.text(), "hi");

        let accounts = dispatcher.pool.accounts().await;
        let failed = accounts.iter().find(|a| a.email == "db@x.com").unwrap();
        assert!(!failed.is_usable_for("claude-sonnet-4-5"));
    }

    #[tokio::test]
    async fn test_429_marks_account_rate_limited_and_fails_over() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string("please retry in 1s")
                    .insert_header("content-type", "text/plain"),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_content_ok_body()))
            .mount(&mock_server)
            .await;

        let pool = AccountPool::new_in_memory(vec![
            api_key_account("a@x.com", "key-a"),
            api_key_account("b@x.com", "key-b"),
        ]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let response = dispatcher.send(&request("claude-sonnet-4-5")).await.unwrap();
        assert_eq!(response.text(), "hi");

        let accounts = dispatcher.pool.accounts().await;
        let limited = accounts.iter().find(|a| a.email == "a@x.com").unwrap();
        assert!(!limited.is_usable_for("claude-sonnet-4-5"));
    }

    #[tokio::test]
    async fn test_all_accounts_rate_limited_surfaces_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("retry in 600s"))
            .mount(&mock_server)
            .await;

        let pool = AccountPool::new_in_memory(vec![api_key_account("solo@x.com", "key-a")]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let result = dispatcher.send(&request("claude-sonnet-4-5")).await;
        assert!(matches!(result, Err(DispatchError::AllRateLimited { .. })));
    }

    #[tokio::test]
    async fn test_other_4xx_is_fatal_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&mock_server)
            .await;

        let pool = AccountPool::new_in_memory(vec![api_key_account("a@x.com", "key-a")]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let result = dispatcher.send(&request("claude-sonnet-4-5")).await;
        match result {
            Err(DispatchError::Fatal { status, .. }) => assert_eq!(status, 400),
            other => panic!("expected Fatal(400), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_thinking_model_accumulates_from_sse_stream() {
        let sse_body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[],\"model\":\"claude-sonnet-4-5-thinking\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":3,\"output_tokens\":1}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_body, "text/event-stream"),
            )
            .mount(&mock_server)
            .await;

        let pool = AccountPool::new_in_memory(vec![api_key_account("a@x.com", "key-a")]);
        let dispatcher = dispatcher_against(pool, &mock_server.uri());

        let response = dispatcher
            .send(&request("claude-sonnet-4-5-thinking"))
            .await
            .unwrap();
        assert_eq!(response.text(), "hi");
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.output_tokens, 1);
    }

    #[tokio::test]
    async fn test_accumulate_stream_helper_applies_deltas_directly() {
        let events: Vec<std::result::Result<StreamEvent, crate::translate::error::TranslateError>> = vec![
            Ok(StreamEvent::MessageStart {
                message: crate::translate::stream::PartialMessage {
                    id: "msg_1".into(),
                    message_type: "message".into(),
                    role: Role::Assistant,
                    content: vec![],
                    model: "claude-sonnet-4-5".into(),
                    usage: Some(Usage::new(3, 0)),
                },
            }),
            Ok(StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::text(""),
            }),
            Ok(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::text("hello"),
            }),
            Ok(StreamEvent::ContentBlockStop { index: 0 }),
            Ok(StreamEvent::MessageDelta {
                delta: crate::translate::stream::MessageDelta::new(Some(StopReason::EndTurn)),
                usage: Some(Usage::new(3, 1)),
            }),
            Ok(StreamEvent::MessageStop),
        ];

        // Drive the same reducer `accumulate_stream` uses, but fed from a
        // plain in-memory event list rather than a real `SseStream`, since
        // `SseStream` can only be constructed over a byte stream.
        let mut id = String::new();
        let mut model = String::new();
        let mut content: Vec<ContentBlock> = Vec::new();
        let mut stop_reason = None;
        let mut usage = Usage::default();
        for event in events {
            match event.unwrap() {
                StreamEvent::MessageStart { message } => {
                    id = message.id;
                    model = message.model;
                    if let Some(u) = message.usage {
                        usage = u;
                    }
                }
                StreamEvent::ContentBlockStart { index, content_block } => {
                    if content.len() <= index {
                        content.resize(index + 1, ContentBlock::text(""));
                    }
                    content[index] = content_block;
                }
                StreamEvent::ContentBlockDelta { index, delta } => {
                    if let Some(block) = content.get_mut(index) {
                        apply_delta(block, delta);
                    }
                }
                StreamEvent::ContentBlockStop { .. } => {}
                StreamEvent::MessageDelta { delta, usage: delta_usage } => {
                    if delta.stop_reason.is_some() {
                        stop_reason = delta.stop_reason;
                    }
                    if let Some(u) = delta_usage {
                        usage = u;
                    }
                }
                StreamEvent::MessageStop => break,
                _ => {}
            }
        }
        let response = MessagesResponse::new(id, model, content, stop_reason, usage);
        assert_eq!(response.text(), "hello");
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.output_tokens, 1);
    }
}
