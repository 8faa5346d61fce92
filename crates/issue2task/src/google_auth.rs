//! Google OAuth: authorization-code exchange, userinfo lookup, and the
//! token provider that refreshes and persists access tokens.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::store::Store;

/// Google OAuth consent screen URL.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// OAuth scopes the service requests: Tasks access plus the account email
/// used as the user ID.
pub const OAUTH_SCOPES: &str =
    "https://www.googleapis.com/auth/tasks https://www.googleapis.com/auth/userinfo.email";

/// Refresh when less than five minutes of validity remain.
const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// Google OAuth client.
#[derive(Debug, Clone)]
pub struct GoogleAuthClient {
    client: reqwest::Client,
    token_url: String,
    userinfo_url: String,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Bearer access token
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Refresh token; only present on the initial consent exchange
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Userinfo endpoint response.
#[derive(Debug, Deserialize)]
pub struct UserInfo {
    /// Account email; used as the user ID
    pub email: String,
}

impl GoogleAuthClient {
    /// Create a client against the public Google endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_urls(
            "https://oauth2.googleapis.com/token",
            "https://www.googleapis.com/oauth2/v2/userinfo",
        )
    }

    /// Create a client with custom endpoint URLs.
    pub fn with_urls(token_url: &str, userinfo_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token_url: token_url.to_string(),
            userinfo_url: userinfo_url.to_string(),
        })
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .context("Failed to send token exchange request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("token exchange failed: {status} - {body}"));
        }

        response
            .json()
            .await
            .context("Failed to parse token response")
    }

    /// Refresh an access token.
    pub async fn refresh(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("token refresh failed: {status} - {body}"));
        }

        response
            .json()
            .await
            .context("Failed to parse refresh response")
    }

    /// Fetch the authenticated user's profile.
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await
            .context("Failed to send userinfo request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("userinfo request failed: {status} - {body}"));
        }

        response
            .json()
            .await
            .context("Failed to parse userinfo response")
    }
}

/// Return a valid access token for `user_id`, refreshing and persisting a
/// renewed token when the stored one is expired or about to expire.
///
/// `Ok(None)` means the user has no usable credentials (never linked, or no
/// refresh token on file); transport and store failures surface as errors.
pub async fn valid_access_token(
    store: &Store,
    auth: &GoogleAuthClient,
    config: &Config,
    user_id: &str,
) -> Result<Option<String>> {
    let Some(token) = store.oauth_token(user_id).await? else {
        return Ok(None);
    };

    let now = Utc::now().timestamp_millis();
    if token.expires_at > now + EXPIRY_BUFFER_MS {
        return Ok(Some(token.access_token));
    }

    if token.refresh_token.is_empty() {
        warn!(user_id = %user_id, "No refresh token available; re-authentication required");
        return Ok(None);
    }

    let (Some(client_id), Some(client_secret)) =
        (&config.google_client_id, &config.google_client_secret)
    else {
        return Err(anyhow!("Google OAuth client credentials are not configured"));
    };

    let refreshed = auth
        .refresh(client_id, client_secret, &token.refresh_token)
        .await?;

    let expires_at = now + refreshed.expires_in * 1000;
    match refreshed.refresh_token.as_deref() {
        // Google can rotate the refresh token; keep the newest one.
        Some(rotated) => {
            store
                .save_oauth_token(user_id, &refreshed.access_token, rotated, expires_at)
                .await?;
        }
        None => {
            store
                .update_access_token(user_id, &refreshed.access_token, expires_at)
                .await?;
        }
    }

    debug!(user_id = %user_id, "Refreshed Google access token");
    Ok(Some(refreshed.access_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let json = r#"{
            "access_token": "ya29.token",
            "expires_in": 3599,
            "refresh_token": "1//refresh",
            "scope": "https://www.googleapis.com/auth/tasks",
            "token_type": "Bearer"
        }"#;

        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "ya29.token");
        assert_eq!(token.expires_in, 3599);
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[test]
    fn test_parse_refresh_response_without_refresh_token() {
        let json = r#"{
            "access_token": "ya29.renewed",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/tasks",
            "token_type": "Bearer"
        }"#;

        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(token.refresh_token.is_none());
    }
}
