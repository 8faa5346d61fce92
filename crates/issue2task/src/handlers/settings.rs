//! Account settings: task-list listing and selection.
//!
//! These surfaces are owned by the settings UI, not the sync core; the
//! orchestrator only ever reads the persisted selection.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::oauth::html_escape;
use crate::google_auth::valid_access_token;
use crate::server::AppState;

/// `user_id` query parameter.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    /// Linked Google account email
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Task list selection request body.
#[derive(Debug, Deserialize)]
pub struct SelectTaskListRequest {
    /// Linked Google account email
    pub user_id: String,
    /// Task list to create new tasks into
    pub task_list_id: String,
    /// Display name, stored for the settings page
    #[serde(default)]
    pub task_list_name: Option<String>,
}

/// Settings index: linked accounts with links to task-list selection.
pub async fn settings_index(State(state): State<AppState>) -> Response {
    let accounts = match state.store.linked_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            error!(error = %e, "Failed to list linked accounts");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to list accounts").into_response();
        }
    };

    let rows = if accounts.is_empty() {
        "<p>No accounts linked yet.</p>".to_string()
    } else {
        accounts
            .iter()
            .map(|account| {
                format!(
                    r#"<li><a href="/settings/tasklists/select?user_id={}">{}</a></li>"#,
                    urlencoding::encode(&account.user_id),
                    html_escape(&account.user_id)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Settings - GitHub Issues to Google Tasks</title>
  </head>
  <body>
    <h1>Settings</h1>
    <ul>{rows}</ul>
    <p><a href="/auth/google">Link a Google account</a></p>
  </body>
</html>"#
    ))
    .into_response()
}

/// JSON API: the user's Google task lists.
pub async fn list_task_lists(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    let Some(user_id) = &query.user_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "user_id is required" })),
        )
            .into_response();
    };

    let access_token = match user_access_token(&state, user_id).await {
        Ok(token) => token,
        Err(response) => return response,
    };

    match state.tasks.task_lists(&access_token).await {
        Ok(task_lists) => Json(json!({ "taskLists": task_lists })).into_response(),
        Err(e) => {
            error!(error = %e, user_id = %user_id, "Failed to fetch task lists");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to fetch task lists" })),
            )
                .into_response()
        }
    }
}

/// Persist the user's task list selection.
pub async fn save_selection(
    State(state): State<AppState>,
    Json(request): Json<SelectTaskListRequest>,
) -> Response {
    if request.user_id.is_empty() || request.task_list_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "user_id and task_list_id are required" })),
        )
            .into_response();
    }

    match state
        .store
        .save_user_settings(
            &request.user_id,
            &request.task_list_id,
            request.task_list_name.as_deref(),
        )
        .await
    {
        Ok(()) => Json(json!({ "success": true, "message": "Task list selection saved" }))
            .into_response(),
        Err(e) => {
            error!(error = %e, user_id = %request.user_id, "Failed to save task list selection");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to save task list selection" })),
            )
                .into_response()
        }
    }
}

/// HTML page for picking which task list new tasks are created into.
pub async fn select_page(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    let Some(user_id) = &query.user_id else {
        return (StatusCode::BAD_REQUEST, Html(simple_page("Error", "user_id is required")))
            .into_response();
    };

    let access_token = match user_access_token(&state, user_id).await {
        Ok(token) => token,
        Err(response) => return response,
    };

    let task_lists = match state.tasks.task_lists(&access_token).await {
        Ok(lists) => lists,
        Err(e) => {
            error!(error = %e, user_id = %user_id, "Failed to fetch task lists");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(simple_page("Error", "failed to fetch task lists")),
            )
                .into_response();
        }
    };

    let selected = match state.store.user_settings(user_id).await {
        Ok(settings) => settings.map(|s| s.selected_task_list_id),
        Err(e) => {
            error!(error = %e, user_id = %user_id, "Failed to read user settings");
            None
        }
    };

    let items = task_lists
        .iter()
        .map(|list| {
            let checked = if selected.as_deref() == Some(list.id.as_str()) {
                " checked"
            } else {
                ""
            };
            format!(
                r#"<label><input type="radio" name="tasklist" value="{}" data-name="{}"{checked}> {}</label><br>"#,
                html_escape(&list.id),
                html_escape(&list.title),
                html_escape(&list.title)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let user_id_json =
        serde_json::to_string(user_id).unwrap_or_else(|_| "\"\"".to_string());

    Html(format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Select Task List</title>
  </head>
  <body>
    <h1>Select Task List</h1>
    <p>Choose which Google Tasks list to use for GitHub issues</p>
    <form id="tasklist-form">{items}</form>
    <button id="save">Save Selection</button>
    <p id="message"></p>
    <script>
      const userId = {user_id_json};
      document.getElementById('save').addEventListener('click', async () => {{
        const choice = document.querySelector('input[name="tasklist"]:checked');
        if (!choice) return;
        const response = await fetch('/settings/tasklists/select', {{
          method: 'POST',
          headers: {{ 'Content-Type': 'application/json' }},
          body: JSON.stringify({{
            user_id: userId,
            task_list_id: choice.value,
            task_list_name: choice.dataset.name,
          }}),
        }});
        const data = await response.json();
        document.getElementById('message').textContent =
          response.ok ? 'Task list selection saved!' : 'Error: ' + (data.error || 'unknown');
      }});
    </script>
  </body>
</html>"#
    ))
    .into_response()
}

/// Resolve a valid access token for a settings request, mapping the failure
/// modes to HTTP responses.
async fn user_access_token(state: &AppState, user_id: &str) -> Result<String, Response> {
    match valid_access_token(&state.store, &state.google_auth, &state.config, user_id).await {
        Ok(Some(token)) => Ok(token),
        Ok(None) => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "failed to get valid access token" })),
        )
            .into_response()),
        Err(e) => {
            error!(error = %e, user_id = %user_id, "Failed to obtain access token");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to get valid access token" })),
            )
                .into_response())
        }
    }
}

fn simple_page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head><meta charset="UTF-8"><title>{}</title></head>
  <body><h1>{}</h1><p>{}</p></body>
</html>"#,
        html_escape(title),
        html_escape(title),
        html_escape(body)
    )
}
