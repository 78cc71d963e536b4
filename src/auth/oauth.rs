//! Google OAuth PKCE flow for Cloud Code (Antigravity) accounts.
//!
//! Ported from `oauth/gemini.rs`: PKCE authorization URL construction,
//! code exchange, and refresh-token exchange via the `oauth2` crate.
//! Google expects client credentials in the request body rather than an
//! Authorization header, hence `AuthType::RequestBody`.

use oauth2::basic::BasicClient;
use oauth2::TokenResponse as _;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use tracing::debug;

use super::error::{AuthError, BrokerError, Result};
use super::token::{parse_refresh_parts, with_project_ids, CachedToken};

/// OAuth client ID used by the Antigravity desktop app. Intentionally
/// public, matching the distributed client.
pub const CLIENT_ID: &str =
    "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com";
pub const CLIENT_SECRET: &str = "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";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_CALLBACK_PORT: u16 = 51121;

const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/cclog",
    "https://www.googleapis.com/auth/experimentsandconfigs",
];

#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
}

impl OAuthConfig {
    pub fn new(callback_port: u16) -> Self {
        Self {
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            redirect_uri: format!("http://127.0.0.1:{callback_port}/oauth/callback/gemini"),
        }
    }
}

fn build_client(config: &OAuthConfig) -> Result<BasicClient> {
    let client_id = ClientId::new(config.client_id.clone());
    let client_secret = ClientSecret::new(config.client_secret.clone());
    let auth_url = AuthUrl::new(config.auth_url.clone())
        .map_err(|e| BrokerError::MalformedResponse(format!("invalid auth url: {e}")))?;
    let token_url = TokenUrl::new(config.token_url.clone())
        .map_err(|e| BrokerError::MalformedResponse(format!("invalid token url: {e}")))?;
    let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
        .map_err(|e| BrokerError::MalformedResponse(format!("invalid redirect uri: {e}")))?;

    Ok(BasicClient::new(client_id)
        .set_client_secret(client_secret)
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url)
        .set_auth_type(AuthType::RequestBody))
}

/// Build the authorization URL plus the PKCE verifier to store until the
/// callback completes. `access_type=offline` + `prompt=consent` force a
/// refresh token on every consent, matching Google's requirements.
pub fn build_authorize_url(config: &OAuthConfig, state: &str) -> Result<(String, String)> {
    let client = build_client(config)?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut request = client
        .authorize_url(|| CsrfToken::new(state.to_string()))
        .set_pkce_challenge(pkce_challenge)
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent");

    for scope in SCOPES {
        request = request.add_scope(Scope::new(scope.to_string()));
    }

    let (url, _csrf) = request.url();
    Ok((url.to_string(), pkce_verifier.secret().to_string()))
}

/// Exchange an authorization code for an initial token pair.
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<(CachedToken, String)> {
    let client = build_client(config)?;
    let response = client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()))
        .request_async(http)
        .await
        .map_err(map_token_error)?;

    let refresh = response
        .refresh_token()
        .map(|t| t.secret().to_string())
        .ok_or_else(|| {
            BrokerError::MalformedResponse(
                "no refresh token in response (missing access_type=offline?)".into(),
            )
        })?;

    let expires_in = response.expires_in().map(|d| d.as_secs() as i64).unwrap_or(3600);
    Ok((
        CachedToken::new(response.access_token().secret().to_string(), expires_in),
        refresh,
    ))
}

/// Refresh an access token. `refresh_token_value` may carry the composite
/// `refresh|project_id|managed_project_id` format; only the base refresh
/// token is sent upstream, and any project IDs are re-attached to the
/// returned refresh token string.
pub async fn refresh_token(
    http: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token_value: &str,
) -> Result<(CachedToken, String)> {
    let (base_refresh, project_id, managed_project_id) = parse_refresh_parts(refresh_token_value);
    debug!("refreshing Gemini access token");

    let client = build_client(config)?;
    let response = client
        .exchange_refresh_token(&RefreshToken::new(base_refresh.to_string()))
        .request_async(http)
        .await
        .map_err(map_token_error)?;

    let new_base_refresh = response
        .refresh_token()
        .map(|t| t.secret().to_string())
        .unwrap_or_else(|| base_refresh.to_string());

    let new_refresh = match project_id {
        Some(project) => with_project_ids(&new_base_refresh, project, managed_project_id),
        None => new_base_refresh,
    };

    let expires_in = response.expires_in().map(|d| d.as_secs() as i64).unwrap_or(3600);
    Ok((
        CachedToken::new(response.access_token().secret().to_string(), expires_in),
        new_refresh,
    ))
}

fn map_token_error<RE: std::error::Error + 'static>(
    err: oauth2::RequestTokenError<
        RE,
        oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>,
    >,
) -> BrokerError {
    use oauth2::RequestTokenError as E;
    match err {
        E::ServerResponse(resp) => {
            if matches!(resp.error(), oauth2::basic::BasicErrorResponseType::InvalidGrant) {
                BrokerError::Auth(AuthError::InvalidGrant)
            } else {
                BrokerError::MalformedResponse(format!("{:?}", resp.error()))
            }
        }
        E::Request(_) => BrokerError::MalformedResponse("network error during token request".into()),
        other => BrokerError::MalformedResponse(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(uri: &str) -> OAuthConfig {
        OAuthConfig {
            client_id: "test-client".into(),
            client_secret: "test-secret".into(),
            auth_url: DEFAULT_AUTH_URL.into(),
            token_url: uri.to_string(),
            redirect_uri: "http://127.0.0.1:51121/oauth/callback/gemini".into(),
        }
    }

    #[test]
    fn test_build_authorize_url_has_offline_consent() {
        let config = OAuthConfig::new(DEFAULT_CALLBACK_PORT);
        let (url, verifier) = build_authorize_url(&config, "state").unwrap();
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(!verifier.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_token_preserves_composite_project_ids() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server.uri());
        let (token, refresh) =
            refresh_token(&reqwest::Client::new(), &config, "base-rt|proj-1|managed-1")
                .await
                .unwrap();

        assert_eq!(token.access_token, "new-token");
        assert_eq!(refresh, "base-rt|proj-1|managed-1");
    }

    #[tokio::test]
    async fn test_refresh_token_invalid_grant_maps_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been revoked."
            })))
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server.uri());
        let result = refresh_token(&reqwest::Client::new(), &config, "revoked-rt").await;

        assert!(matches!(
            result,
            Err(BrokerError::Auth(AuthError::InvalidGrant))
        ));
    }
}
