//! HTTP server for GitHub webhooks and account settings.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::github::GitHubClient;
use crate::google_auth::GoogleAuthClient;
use crate::google_tasks::TasksClient;
use crate::handlers::{oauth, settings};
use crate::store::Store;
use crate::sync;
use crate::webhooks::{classify, verify_webhook_signature, Classification, ProjectsV2ItemEvent};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Configuration.
    pub config: Config,
    /// Durable store (mappings, settings, tokens).
    pub store: Store,
    /// GitHub API client.
    pub github: GitHubClient,
    /// Google OAuth client.
    pub google_auth: GoogleAuthClient,
    /// Google Tasks API client.
    pub tasks: TasksClient,
}

/// Build the HTTP router for the sync service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Webhook endpoint
        .route("/webhook", post(webhook_handler))
        // OAuth onboarding
        .route("/auth/google", get(oauth::start_google_auth))
        .route("/google-callback", get(oauth::google_callback))
        // Settings
        .route("/settings", get(settings::settings_index))
        .route("/settings/tasklists", get(settings::list_task_lists))
        .route(
            "/settings/tasklists/select",
            get(settings::select_page).post(settings::save_selection),
        )
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    if state.config.webhook_secret.is_none() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(json!({ "status": "ready" })))
}

/// Handle incoming GitHub webhooks.
///
/// This handler:
/// 1. Verifies the `X-Hub-Signature-256` HMAC signature
/// 2. Parses the payload into a typed event
/// 3. Classifies the event and, when actionable, runs the sync orchestrator
///
/// Intentionally-ignored events are acknowledged with 200 so GitHub does not
/// mark the delivery as failed and retry it.
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let Some(secret) = &state.config.webhook_secret else {
        error!("WEBHOOK_SECRET is not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "server configuration error".to_string(),
        );
    };

    let Some(signature) = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Missing X-Hub-Signature-256 header");
        return (StatusCode::UNAUTHORIZED, "missing signature".to_string());
    };

    if !verify_webhook_signature(&body, signature, secret) {
        warn!("Invalid webhook signature");
        return (StatusCode::UNAUTHORIZED, "invalid signature".to_string());
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let delivery_id = headers
        .get("x-github-delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    info!(
        delivery_id = %delivery_id,
        event_type = %event_type,
        "Received GitHub webhook"
    );

    let event: ProjectsV2ItemEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, event_type = %event_type, "Failed to parse webhook payload");
            return (StatusCode::BAD_REQUEST, "invalid payload".to_string());
        }
    };

    match classify(event_type, &event) {
        Classification::Invalid(reason) => {
            warn!(reason, event_type = %event_type, "Rejecting webhook");
            (StatusCode::BAD_REQUEST, reason.to_string())
        }
        Classification::Skip(reason) => {
            debug!(reason, "Ignoring webhook");
            (StatusCode::OK, format!("skipped: {reason}"))
        }
        Classification::Sync(request) => match sync::handle(&state, &request).await {
            Ok(outcome) => (StatusCode::OK, outcome.message()),
            Err(e) => {
                error!(error = %e, delivery_id = %delivery_id, "Sync failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        },
    }
}
