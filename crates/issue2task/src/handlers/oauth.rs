//! Google OAuth onboarding: consent redirect and callback.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use crate::google_auth::{GOOGLE_AUTH_URL, OAUTH_SCOPES};
use crate::server::AppState;

/// Query parameters Google sends to the callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code on success
    #[serde(default)]
    pub code: Option<String>,
    /// Error code when the user denied consent
    #[serde(default)]
    pub error: Option<String>,
}

/// Start the OAuth flow: redirect to the Google consent screen.
pub async fn start_google_auth(State(state): State<AppState>) -> Response {
    let Some(client_id) = &state.config.google_client_id else {
        error!("GOOGLE_CLIENT_ID is not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Google OAuth is not configured",
        )
            .into_response();
    };

    let Some(base_url) = &state.config.public_base_url else {
        error!("PUBLIC_BASE_URL is not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "public base URL is not configured",
        )
            .into_response();
    };

    let redirect_uri = format!("{base_url}/google-callback");

    // offline access + forced consent so Google returns a refresh token
    let auth_url = format!(
        "{GOOGLE_AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        urlencoding::encode(client_id),
        urlencoding::encode(&redirect_uri),
        urlencoding::encode(OAUTH_SCOPES),
    );

    Redirect::temporary(&auth_url).into_response()
}

/// OAuth callback: exchange the code, resolve the account email, and persist
/// the tokens keyed by that email.
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(oauth_error) = &query.error {
        return Html(error_page(oauth_error)).into_response();
    }

    let Some(code) = &query.code else {
        return (StatusCode::BAD_REQUEST, "no authorization code received").into_response();
    };

    let (Some(client_id), Some(client_secret)) = (
        &state.config.google_client_id,
        &state.config.google_client_secret,
    ) else {
        error!("Google OAuth client credentials are not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Google OAuth is not configured",
        )
            .into_response();
    };

    let Some(base_url) = &state.config.public_base_url else {
        error!("PUBLIC_BASE_URL is not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "public base URL is not configured",
        )
            .into_response();
    };

    let redirect_uri = format!("{base_url}/google-callback");

    let tokens = match state
        .google_auth
        .exchange_code(client_id, client_secret, code, &redirect_uri)
        .await
    {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(error = %e, "Token exchange failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to exchange authorization code",
            )
                .into_response();
        }
    };

    let user_info = match state.google_auth.userinfo(&tokens.access_token).await {
        Ok(info) => info,
        Err(e) => {
            error!(error = %e, "Failed to fetch user info");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to fetch user information",
            )
                .into_response();
        }
    };

    let expires_at = Utc::now().timestamp_millis() + tokens.expires_in * 1000;
    let refresh_token = tokens.refresh_token.as_deref().unwrap_or_default();

    if let Err(e) = state
        .store
        .save_oauth_token(&user_info.email, &tokens.access_token, refresh_token, expires_at)
        .await
    {
        error!(error = %e, user_id = %user_info.email, "Failed to persist OAuth tokens");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to save credentials",
        )
            .into_response();
    }

    info!(user_id = %user_info.email, "Linked Google account");
    Html(success_page(&user_info.email)).into_response()
}

fn error_page(oauth_error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Authentication Error</title>
  </head>
  <body>
    <h1>Authentication Error</h1>
    <p>Error: {}</p>
    <p><a href="/auth/google">Try again</a></p>
  </body>
</html>"#,
        html_escape(oauth_error)
    )
}

fn success_page(email: &str) -> String {
    let encoded = urlencoding::encode(email).into_owned();
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Authentication Successful</title>
  </head>
  <body>
    <h1>Authentication Successful</h1>
    <p><strong>Email:</strong> {}</p>
    <p>Redirecting to task list selection...</p>
    <script>
      setTimeout(() => {{
        window.location.href = '/settings/tasklists/select?user_id={encoded}';
      }}, 1500);
    </script>
  </body>
</html>"#,
        html_escape(email)
    )
}

/// Minimal escaping for values interpolated into HTML.
pub(crate) fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<script>"x" & 'y'</script>"#),
            "&lt;script&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_success_page_escapes_email() {
        let page = success_page("a+b@example.com");
        assert!(page.contains("a+b@example.com"));
        assert!(page.contains("user_id=a%2Bb%40example.com"));
    }
}
