//! Sync service binary.
//!
//! Standalone HTTP service relaying GitHub Projects V2 field changes into
//! Google Tasks.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use issue2task::{server, AppState, Config, GitHubClient, GoogleAuthClient, Store, TasksClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("issue2task=info".parse()?))
        .init();

    info!("Starting issue2task service...");

    // Load configuration
    let config = Config::default();

    if config.webhook_secret.is_none() {
        error!("WEBHOOK_SECRET is not set. Webhook deliveries will be rejected.");
    }
    if config.github_app_id.is_none() || config.github_private_key.is_none() {
        error!("GitHub App credentials are not set. Sync will fail until configured.");
    }

    // Open the database
    let store = Store::connect(&config.database_url)
        .await
        .context("Failed to open database")?;

    info!(database_url = %config.database_url, "Database ready");

    // Initialize API clients
    let github = GitHubClient::with_api_url(&config.github_api_url)
        .context("Failed to create GitHub client")?;
    let google_auth = GoogleAuthClient::with_urls(&config.google_token_url, &config.google_userinfo_url)
        .context("Failed to create Google OAuth client")?;
    let tasks = TasksClient::with_api_url(&config.google_tasks_url)
        .context("Failed to create Google Tasks client")?;

    // Build application state
    let state = AppState {
        config: config.clone(),
        store,
        github,
        google_auth,
        tasks,
    };

    // Build router
    let app = server::build_router(state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(port = config.port, "issue2task service listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
