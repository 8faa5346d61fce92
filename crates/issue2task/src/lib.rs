//! GitHub Projects V2 to Google Tasks relay.
//!
//! This crate provides:
//! - Webhook payload parsing, signature verification, and event classification
//! - GitHub App authentication and Projects V2 item lookup
//! - Google OAuth token exchange and refresh
//! - Google Tasks REST gateway (create/update/complete tasks, list task lists)
//! - Durable issue-URL → task-id mapping store (SQLite)
//! - HTTP server for webhook handling and account settings

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Many async API methods can fail

pub mod config;
pub mod github;
pub mod google_auth;
pub mod google_tasks;
pub mod handlers;
pub mod server;
pub mod store;
pub mod sync;
pub mod webhooks;

pub use config::Config;
pub use github::GitHubClient;
pub use google_auth::GoogleAuthClient;
pub use google_tasks::TasksClient;
pub use server::AppState;
pub use store::Store;
pub use webhooks::{classify, verify_webhook_signature, Classification, ProjectsV2ItemEvent};
