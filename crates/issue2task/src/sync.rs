//! Webhook-to-task synchronization orchestration.
//!
//! One webhook delivery runs the sequence: installation token → issue fetch
//! → active user → user token → task mutation → mapping persistence. Every
//! step short-circuits on first failure; GitHub's own redelivery on non-2xx
//! is the only retry mechanism across deliveries.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::github::IssueRef;
use crate::google_auth::valid_access_token;
use crate::server::AppState;
use crate::store::UserSettings;
use crate::webhooks::{SyncAction, SyncRequest};

/// How often a mapping save is attempted before the task is declared
/// orphaned.
const MAPPING_SAVE_ATTEMPTS: u32 = 3;

/// Failure taxonomy for one delivery. All variants surface as HTTP 500 so
/// GitHub redelivers the webhook.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Installation or user token acquisition failed.
    #[error("failed to obtain {0} access token")]
    Auth(&'static str),
    /// No Google account is configured as the sync target.
    #[error("user not configured")]
    NotConfigured,
    /// Issue lookup on GitHub failed.
    #[error("failed to fetch project item from GitHub")]
    UpstreamFetch,
    /// Task create/update/complete failed.
    #[error("failed to {0} Google Task")]
    UpstreamWrite(&'static str),
    /// Store read or write failed; the value names the table involved.
    #[error("{0} store operation failed")]
    Store(&'static str),
}

/// Terminal outcome of a processed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A task was created and the mapping persisted.
    Created,
    /// The mapped task was updated.
    Updated,
    /// The mapped task was completed.
    Completed,
    /// Nothing to do; acknowledged with 200.
    Skipped(&'static str),
}

impl SyncOutcome {
    /// Short response body for GitHub's delivery log.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Created => "task created".to_string(),
            Self::Updated => "task updated".to_string(),
            Self::Completed => "task completed".to_string(),
            Self::Skipped(reason) => format!("skipped: {reason}"),
        }
    }
}

/// Process one actionable webhook delivery.
pub async fn handle(state: &AppState, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
    let config = &state.config;

    let (Some(app_id), Some(private_key)) = (&config.github_app_id, &config.github_private_key)
    else {
        error!("GitHub App credentials are not configured");
        return Err(SyncError::Auth("installation"));
    };

    let installation_token = match state
        .github
        .installation_access_token(app_id, private_key, request.installation_id)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            error!(
                error = %e,
                installation_id = request.installation_id,
                "Failed to obtain installation access token"
            );
            return Err(SyncError::Auth("installation"));
        }
    };

    let issue = match state
        .github
        .project_item(
            &request.org,
            request.project_number,
            request.item_id,
            &installation_token,
        )
        .await
    {
        Ok(issue) => issue,
        Err(e) => {
            error!(
                error = %e,
                org = %request.org,
                project_number = request.project_number,
                item_id = request.item_id,
                "Failed to fetch project item"
            );
            return Err(SyncError::UpstreamFetch);
        }
    };

    let settings = resolve_active_user(state).await?;

    let access_token = match valid_access_token(
        &state.store,
        &state.google_auth,
        config,
        &settings.user_id,
    )
    .await
    {
        Ok(Some(token)) => token,
        Ok(None) => {
            error!(user_id = %settings.user_id, "No usable Google credentials for sync user");
            return Err(SyncError::Auth("user"));
        }
        Err(e) => {
            error!(error = %e, user_id = %settings.user_id, "Failed to obtain Google access token");
            return Err(SyncError::Auth("user"));
        }
    };

    match &request.action {
        SyncAction::DueDate { due } => {
            sync_due_date(state, &settings, &access_token, &issue, due).await
        }
        SyncAction::Complete => complete_task(state, &settings, &access_token, &issue).await,
    }
}

/// Select the Google account whose tasks are mutated.
///
/// A pinned `SYNC_USER_ID` wins; otherwise the first configured account by
/// creation time. Single-tenant deployments have exactly one row either way.
async fn resolve_active_user(state: &AppState) -> Result<UserSettings, SyncError> {
    let lookup = match &state.config.sync_user_id {
        Some(user_id) => state.store.user_settings(user_id).await,
        None => state.store.first_user_settings().await,
    };

    match lookup {
        Ok(Some(settings)) => Ok(settings),
        Ok(None) => {
            error!("No user settings configured; cannot determine sync target");
            Err(SyncError::NotConfigured)
        }
        Err(e) => {
            error!(error = %e, "Failed to read user settings");
            Err(SyncError::Store("settings"))
        }
    }
}

/// Create or update the task mapped to the issue.
async fn sync_due_date(
    state: &AppState,
    settings: &UserSettings,
    access_token: &str,
    issue: &IssueRef,
    due: &str,
) -> Result<SyncOutcome, SyncError> {
    let list_id = &settings.selected_task_list_id;

    let existing = state.store.mapping(&issue.url).await.map_err(|e| {
        error!(error = %e, issue_url = %issue.url, "Failed to look up issue-task mapping");
        SyncError::Store("mapping")
    })?;

    if let Some(mapping) = existing {
        update_mapped_task(state, access_token, list_id, &mapping.task_id, issue, due).await?;
        info!(issue_url = %issue.url, task_id = %mapping.task_id, "Updated task due date");
        return Ok(SyncOutcome::Updated);
    }

    let task_id = state
        .tasks
        .create_task(access_token, list_id, &issue.title, &issue.url, due)
        .await
        .map_err(|e| {
            error!(error = %e, issue_url = %issue.url, "Failed to create Google Task");
            SyncError::UpstreamWrite("create")
        })?;

    // The task now exists remotely; losing the mapping would orphan it, so
    // the save is retried before giving up.
    let mut inserted = None;
    for attempt in 1..=MAPPING_SAVE_ATTEMPTS {
        match state.store.save_mapping(&issue.url, &task_id).await {
            Ok(flag) => {
                inserted = Some(flag);
                break;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    attempt,
                    issue_url = %issue.url,
                    "Failed to save issue-task mapping"
                );
            }
        }
    }

    match inserted {
        Some(true) => {
            info!(issue_url = %issue.url, task_id = %task_id, "Created task and saved mapping");
            Ok(SyncOutcome::Created)
        }
        Some(false) => {
            // A concurrent delivery for the same issue saved a mapping first.
            // The task created above has no mapping pointing at it.
            warn!(
                issue_url = %issue.url,
                orphaned_task_id = %task_id,
                "Lost mapping insert race; updating the mapped task instead"
            );

            let winner = state
                .store
                .mapping(&issue.url)
                .await
                .map_err(|e| {
                    error!(error = %e, issue_url = %issue.url, "Failed to re-read mapping");
                    SyncError::Store("mapping")
                })?
                .ok_or(SyncError::Store("mapping"))?;

            update_mapped_task(state, access_token, list_id, &winner.task_id, issue, due).await?;
            Ok(SyncOutcome::Updated)
        }
        None => {
            error!(
                issue_url = %issue.url,
                orphaned_task_id = %task_id,
                "Mapping save failed after retries; Google Task is orphaned"
            );
            Err(SyncError::Store("mapping"))
        }
    }
}

async fn update_mapped_task(
    state: &AppState,
    access_token: &str,
    list_id: &str,
    task_id: &str,
    issue: &IssueRef,
    due: &str,
) -> Result<(), SyncError> {
    state
        .tasks
        .update_task(access_token, list_id, task_id, &issue.title, &issue.url, due)
        .await
        .map_err(|e| {
            error!(error = %e, task_id = %task_id, "Failed to update Google Task");
            SyncError::UpstreamWrite("update")
        })
}

/// Complete the task mapped to the issue, if any.
async fn complete_task(
    state: &AppState,
    settings: &UserSettings,
    access_token: &str,
    issue: &IssueRef,
) -> Result<SyncOutcome, SyncError> {
    let existing = state.store.mapping(&issue.url).await.map_err(|e| {
        error!(error = %e, issue_url = %issue.url, "Failed to look up issue-task mapping");
        SyncError::Store("mapping")
    })?;

    // Never create a task just to complete it.
    let Some(mapping) = existing else {
        info!(issue_url = %issue.url, "Status is Done but issue has no mapped task");
        return Ok(SyncOutcome::Skipped("issue not mapped"));
    };

    state
        .tasks
        .complete_task(access_token, &settings.selected_task_list_id, &mapping.task_id)
        .await
        .map_err(|e| {
            error!(error = %e, task_id = %mapping.task_id, "Failed to complete Google Task");
            SyncError::UpstreamWrite("complete")
        })?;

    info!(issue_url = %issue.url, task_id = %mapping.task_id, "Completed task");
    Ok(SyncOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_messages() {
        assert_eq!(SyncOutcome::Created.message(), "task created");
        assert_eq!(SyncOutcome::Updated.message(), "task updated");
        assert_eq!(SyncOutcome::Completed.message(), "task completed");
        assert_eq!(
            SyncOutcome::Skipped("issue not mapped").message(),
            "skipped: issue not mapped"
        );
    }

    #[test]
    fn test_error_messages_name_the_failure() {
        assert_eq!(
            SyncError::Auth("installation").to_string(),
            "failed to obtain installation access token"
        );
        assert_eq!(SyncError::NotConfigured.to_string(), "user not configured");
        assert_eq!(
            SyncError::UpstreamWrite("create").to_string(),
            "failed to create Google Task"
        );
        assert_eq!(
            SyncError::Store("settings").to_string(),
            "settings store operation failed"
        );
        assert_eq!(
            SyncError::Store("mapping").to_string(),
            "mapping store operation failed"
        );
    }
}
