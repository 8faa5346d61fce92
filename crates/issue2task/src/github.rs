//! GitHub App authentication and Projects V2 item lookup.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// App JWTs are short-lived; GitHub caps them at ten minutes.
const APP_JWT_TTL_SECS: i64 = 600;
/// Backdate `iat` to absorb clock drift between us and GitHub.
const APP_JWT_DRIFT_SECS: i64 = 60;

/// GitHub REST API client for App auth and Projects V2 item lookup.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
}

/// JWT claims for GitHub App authentication.
#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Response from the installation access token endpoint.
#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
}

/// Projects V2 item as returned by the REST API (simplified).
#[derive(Debug, Deserialize)]
struct ProjectItemResponse {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content: Option<ProjectItemContent>,
}

/// Linked content of a project item.
#[derive(Debug, Deserialize)]
struct ProjectItemContent {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

/// Title and URL of the issue a project item links to.
#[derive(Debug, Clone)]
pub struct IssueRef {
    /// Issue title
    pub title: String,
    /// Canonical issue URL
    pub url: String,
}

impl GitHubClient {
    /// Create a new GitHub client against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_api_url("https://api.github.com")
    }

    /// Create a client with a custom API base URL.
    pub fn with_api_url(api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("issue2task/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Mint an installation access token for a GitHub App installation.
    ///
    /// Signs a short-lived RS256 app JWT and exchanges it at the
    /// installation access token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the private key is invalid or the API call fails.
    pub async fn installation_access_token(
        &self,
        app_id: &str,
        private_key_pem: &str,
        installation_id: i64,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            iat: now - APP_JWT_DRIFT_SECS,
            exp: now + APP_JWT_TTL_SECS,
            iss: app_id.to_string(),
        };

        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .context("Invalid GitHub App private key")?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context("Failed to sign GitHub App JWT")?;

        let url = format!(
            "{}/app/installations/{installation_id}/access_tokens",
            self.api_url
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {jwt}"))
            .send()
            .await
            .context("Failed to send installation token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "GitHub API error creating installation token: {status} - {body}"
            ));
        }

        let token: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        debug!(installation_id, "Obtained installation access token");
        Ok(token.token)
    }

    /// Fetch the issue a Projects V2 item links to.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails, the item is not an issue, or
    /// title/URL are missing.
    pub async fn project_item(
        &self,
        org: &str,
        project_number: i64,
        item_id: i64,
        token: &str,
    ) -> Result<IssueRef> {
        let url = format!(
            "{}/orgs/{org}/projectsV2/{project_number}/items/{item_id}",
            self.api_url
        );

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .context("Failed to send project item request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub API error fetching project item: {status} - {body}"));
        }

        let item: ProjectItemResponse = response
            .json()
            .await
            .context("Failed to parse project item response")?;

        if item.content_type.as_deref() != Some("Issue") {
            return Err(anyhow!("project item is not an issue"));
        }

        let content = item
            .content
            .ok_or_else(|| anyhow!("project item has no linked content"))?;

        match (content.title, content.html_url) {
            (Some(title), Some(url)) => Ok(IssueRef { title, url }),
            _ => Err(anyhow!("issue title or URL missing from project item")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let result = GitHubClient::new();
        assert!(result.is_ok());
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let client = GitHubClient::with_api_url("http://localhost:9999/").unwrap();
        assert_eq!(client.api_url, "http://localhost:9999");
    }

    #[test]
    fn test_parse_project_item_response() {
        let json = r#"{
            "id": 42,
            "content_type": "Issue",
            "content": {
                "title": "Fix the flaky test",
                "html_url": "https://github.com/acme/repo/issues/17"
            }
        }"#;

        let item: ProjectItemResponse = serde_json::from_str(json).unwrap();
        assert_eq!(item.content_type.as_deref(), Some("Issue"));
        let content = item.content.unwrap();
        assert_eq!(content.title.as_deref(), Some("Fix the flaky test"));
    }

    #[test]
    fn test_invalid_private_key_rejected() {
        let result = EncodingKey::from_rsa_pem(b"not a key");
        assert!(result.is_err());
    }
}
