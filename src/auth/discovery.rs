//! Cloud Code project discovery.
//!
//! Ported from `providers/gemini/discovery.rs`: calls `:loadCodeAssist`
//! across the ordered endpoint list, falls back to onboarding, and
//! finally to a configured default project ID with a warning.

use tracing::{debug, instrument, warn};

use crate::dispatch::constants::{API_PATH_LOAD_CODE_ASSIST, API_PATH_ONBOARD_USER, DEFAULT_PROJECT_ID, LOAD_CODE_ASSIST_ENDPOINTS};

use super::error::{AuthError, BrokerError, Result};

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadCodeAssistResponse {
    #[serde(default)]
    cloudaicompanion_project: Option<String>,
    #[serde(default)]
    project: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnboardUserResponse {
    project: Option<String>,
}

/// Discover the Cloud Code project ID for an access token, trying each
/// endpoint in order and falling back to onboarding, then to the
/// configured default.
#[instrument(skip(http, token))]
pub async fn discover_project(
    http: &reqwest::Client,
    token: &str,
    hint_project_id: Option<&str>,
) -> String {
    for endpoint in LOAD_CODE_ASSIST_ENDPOINTS {
        let url = format!("{endpoint}{API_PATH_LOAD_CODE_ASSIST}");
        match try_load_code_assist(http, &url, token, hint_project_id).await {
            Ok(response) => {
                if let Some(project) = response.project.or(response.cloudaicompanion_project) {
                    return project;
                }
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "loadCodeAssist failed");
                if let Ok(project) = try_onboard_user(http, endpoint, token).await {
                    return project;
                }
            }
        }
    }

    warn!("all discovery endpoints failed, using default project id");
    DEFAULT_PROJECT_ID.to_string()
}

async fn try_load_code_assist(
    http: &reqwest::Client,
    url: &str,
    token: &str,
    hint_project_id: Option<&str>,
) -> Result<LoadCodeAssistResponse> {
    let body = match hint_project_id {
        Some(project) => serde_json::json!({ "project": project }),
        None => serde_json::json!({}),
    };

    let response = http
        .post(url)
        .bearer_auth(token)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(BrokerError::MalformedResponse(format!(
            "loadCodeAssist returned {status}"
        )));
    }

    debug!(url, "loadCodeAssist ok");
    response
        .json()
        .await
        .map_err(|e| BrokerError::MalformedResponse(e.to_string()))
}

async fn try_onboard_user(http: &reqwest::Client, endpoint: &str, token: &str) -> Result<String> {
    let url = format!("{endpoint}{API_PATH_ONBOARD_USER}");
    let response = http
        .post(&url)
        .bearer_auth(token)
        .json(&serde_json::json!({}))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AuthError::ProjectDiscovery(format!(
            "onboarding failed at {endpoint}"
        ))
        .into());
    }

    let body: OnboardUserResponse = response
        .json()
        .await
        .map_err(|e| BrokerError::MalformedResponse(e.to_string()))?;

    body.project
        .ok_or_else(|| AuthError::ProjectDiscovery("no project in onboard response".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_discover_project_from_load_code_assist() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1internal:loadCodeAssist"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "cloudaicompanionProject": "proj-xyz" })),
            )
            .mount(&mock_server)
            .await;

        let result = try_load_code_assist(
            &reqwest::Client::new(),
            &format!("{}/v1internal:loadCodeAssist", mock_server.uri()),
            "tok",
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.cloudaicompanion_project.as_deref(), Some("proj-xyz"));
    }

    #[tokio::test]
    async fn test_onboard_user_extracts_project() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1internal/onboard_user"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "project": "new-proj" })),
            )
            .mount(&mock_server)
            .await;

        let project = try_onboard_user(&reqwest::Client::new(), &mock_server.uri(), "tok")
            .await
            .unwrap();
        assert_eq!(project, "new-proj");
    }

    #[tokio::test]
    async fn test_load_code_assist_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1internal:loadCodeAssist"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let result = try_load_code_assist(
            &reqwest::Client::new(),
            &format!("{}/v1internal:loadCodeAssist", mock_server.uri()),
            "tok",
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
