//! Credential broker: per-account OAuth token refresh and project-ID
//! discovery, with a cache keyed by account email.
//!
//! Grounded on `providers/gemini/client.rs`'s `CloudCodeClient`, which
//! caches a single account's access token and project id behind
//! `RwLock<Option<...>>`. The broker generalizes that to one entry per
//! pool account, since a single process now juggles many accounts.

pub mod discovery;
pub mod error;
pub mod oauth;
pub mod token;

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::pool::{Account, AccountSource};

pub use error::{AuthError, BrokerError, Result};
pub use oauth::OAuthConfig;
pub use token::CachedToken;

#[derive(Default)]
struct AccountCache {
    token: Option<CachedToken>,
    /// Refresh token currently in use; may get rotated by a refresh call.
    refresh_token: Option<String>,
    project_id: Option<String>,
}

/// Resolves access tokens and Cloud Code project IDs for pool accounts.
///
/// Refreshes and discovers lazily, on demand, and caches per account email.
/// `ApiKey` accounts pass their key through untouched; `DbBacked` accounts
/// are out of scope here -- the collaborator managing that database is
/// expected to resolve credentials before handing the gateway an account.
pub struct CredentialBroker {
    http: reqwest::Client,
    oauth_config: OAuthConfig,
    cache: RwLock<HashMap<String, AccountCache>>,
}

impl CredentialBroker {
    pub fn new(http: reqwest::Client, oauth_config: OAuthConfig) -> Self {
        Self {
            http,
            oauth_config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_default_oauth_config(http: reqwest::Client) -> Self {
        Self::new(http, OAuthConfig::new(oauth::DEFAULT_CALLBACK_PORT))
    }

    /// Resolve a usable access token for `account`, refreshing if the
    /// cached token is missing or within its refresh window.
    pub async fn get_token_for_account(&self, account: &Account) -> Result<String> {
        match &account.source {
            AccountSource::ApiKey { api_key } => Ok(api_key.clone()),
            AccountSource::OAuth { refresh_token } => {
                self.get_oauth_token(&account.email, refresh_token).await
            }
            AccountSource::DbBacked { reference } => Err(BrokerError::Invalid {
                reason: format!(
                    "db-backed account '{reference}' has no broker-managed credential"
                ),
            }),
        }
    }

    async fn get_oauth_token(&self, email: &str, configured_refresh_token: &str) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(email) {
                if let Some(token) = &entry.token {
                    if !token.needs_refresh() {
                        return Ok(token.access_token.clone());
                    }
                }
            }
        }

        let effective_refresh = {
            let cache = self.cache.read().await;
            cache
                .get(email)
                .and_then(|entry| entry.refresh_token.clone())
                .unwrap_or_else(|| configured_refresh_token.to_string())
        };

        debug!(email, "refreshing Cloud Code access token");
        let (new_token, new_refresh) =
            oauth::refresh_token(&self.http, &self.oauth_config, &effective_refresh).await?;

        let mut cache = self.cache.write().await;
        let entry = cache.entry(email.to_string()).or_default();
        entry.token = Some(new_token.clone());
        entry.refresh_token = Some(new_refresh);
        Ok(new_token.access_token)
    }

    /// Resolve the Cloud Code project id for `account`, preferring an
    /// explicitly configured id, then a cached discovery, then running
    /// discovery fresh and caching the result.
    pub async fn get_project_for_account(&self, account: &Account, access_token: &str) -> String {
        if let Some(project_id) = &account.project_id {
            return project_id.clone();
        }

        {
            let cache = self.cache.read().await;
            if let Some(project_id) = cache.get(&account.email).and_then(|e| e.project_id.clone()) {
                return project_id;
            }
        }

        let discovered =
            discovery::discover_project(&self.http, access_token, account.project_id.as_deref())
                .await;

        let mut cache = self.cache.write().await;
        cache.entry(account.email.clone()).or_default().project_id = Some(discovered.clone());
        discovered
    }

    /// Drop the cached access token for `email`, forcing a refresh on the
    /// next call. Called by the dispatcher after an upstream 401.
    pub async fn invalidate_token(&self, email: &str) {
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.get_mut(email) {
            entry.token = None;
        }
    }

    /// Drop the cached project id for `email`, forcing rediscovery.
    pub async fn invalidate_project(&self, email: &str) {
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.get_mut(email) {
            entry.project_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oauth_account(email: &str, refresh: &str) -> Account {
        Account::new(
            email,
            AccountSource::OAuth {
                refresh_token: refresh.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_api_key_account_passes_through() {
        let broker = CredentialBroker::with_default_oauth_config(reqwest::Client::new());
        let account = Account::new(
            "key@x.com",
            AccountSource::ApiKey {
                api_key: "sk-abc".into(),
            },
        );
        let token = broker.get_token_for_account(&account).await.unwrap();
        assert_eq!(token, "sk-abc");
    }

    #[tokio::test]
    async fn test_db_backed_account_is_unresolvable() {
        let broker = CredentialBroker::with_default_oauth_config(reqwest::Client::new());
        let account = Account::new(
            "db@x.com",
            AccountSource::DbBacked {
                reference: "accounts.db#42".into(),
            },
        );
        let result = broker.get_token_for_account(&account).await;
        assert!(matches!(result, Err(BrokerError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_oauth_token_refreshed_and_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = OAuthConfig {
            client_id: "test".into(),
            client_secret: "test".into(),
            auth_url: oauth::DEFAULT_AUTH_URL.into(),
            token_url: mock_server.uri(),
            redirect_uri: "http://127.0.0.1:51121/oauth/callback/gemini".into(),
        };
        let broker = CredentialBroker::new(reqwest::Client::new(), config);
        let account = oauth_account("a@x.com", "rt-1");

        let token = broker.get_token_for_account(&account).await.unwrap();
        assert_eq!(token, "fresh-token");

        // Second call must be served from cache -- the mock expects exactly
        // one hit.
        let token_again = broker.get_token_for_account(&account).await.unwrap();
        assert_eq!(token_again, "fresh-token");
    }

    #[tokio::test]
    async fn test_invalidate_token_forces_refresh() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&mock_server)
            .await;

        let config = OAuthConfig {
            client_id: "test".into(),
            client_secret: "test".into(),
            auth_url: oauth::DEFAULT_AUTH_URL.into(),
            token_url: mock_server.uri(),
            redirect_uri: "http://127.0.0.1:51121/oauth/callback/gemini".into(),
        };
        let broker = CredentialBroker::new(reqwest::Client::new(), config);
        let account = oauth_account("b@x.com", "rt-1");

        broker.get_token_for_account(&account).await.unwrap();
        broker.invalidate_token("b@x.com").await;

        // After invalidation a second refresh round-trip happens; the mock
        // has no `.expect()` bound so this just proves no panic/cache bug.
        let token = broker.get_token_for_account(&account).await.unwrap();
        assert_eq!(token, "tok-1");
    }

    #[tokio::test]
    async fn test_project_for_account_prefers_configured_id() {
        let broker = CredentialBroker::with_default_oauth_config(reqwest::Client::new());
        let mut account = oauth_account("c@x.com", "rt-1");
        account.project_id = Some("configured-proj".into());

        let project = broker.get_project_for_account(&account, "tok").await;
        assert_eq!(project, "configured-proj");
    }

    #[tokio::test]
    async fn test_invalidate_project_on_unknown_account_is_a_noop() {
        let broker = CredentialBroker::with_default_oauth_config(reqwest::Client::new());
        // No cache entry exists yet for this email; must not panic.
        broker.invalidate_project("never-seen@x.com").await;
    }
}
