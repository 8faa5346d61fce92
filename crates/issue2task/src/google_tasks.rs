//! Google Tasks REST gateway.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Google Tasks API client.
#[derive(Debug, Clone)]
pub struct TasksClient {
    client: reqwest::Client,
    api_url: String,
}

/// A Google Tasks list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    /// List ID
    pub id: String,
    /// Display name
    pub title: String,
    /// Last update timestamp
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskListsResponse {
    #[serde(default)]
    items: Vec<TaskList>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

/// Normalize a webhook due date for the Tasks API.
///
/// GitHub date fields deliver bare `YYYY-MM-DD` values; the Tasks API wants
/// RFC 3339. Bare dates become UTC midnight, anything else passes through.
#[must_use]
pub fn normalize_due_date(raw: &str) -> String {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => format!("{date}T00:00:00.000Z"),
        Err(_) => raw.to_string(),
    }
}

impl TasksClient {
    /// Create a client against the public Tasks API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_api_url("https://tasks.googleapis.com/tasks/v1")
    }

    /// Create a client with a custom API base URL.
    pub fn with_api_url(api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get all task lists for the authenticated user.
    pub async fn task_lists(&self, access_token: &str) -> Result<Vec<TaskList>> {
        let url = format!("{}/users/@me/lists", self.api_url);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await
            .context("Failed to send task lists request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("failed to fetch task lists: {status} - {body}"));
        }

        let lists: TaskListsResponse = response
            .json()
            .await
            .context("Failed to parse task lists response")?;

        Ok(lists.items)
    }

    /// Create a task; the issue URL travels in the task notes.
    ///
    /// Returns the new task's ID.
    pub async fn create_task(
        &self,
        access_token: &str,
        task_list_id: &str,
        title: &str,
        notes: &str,
        due_date: &str,
    ) -> Result<String> {
        let url = format!("{}/lists/{task_list_id}/tasks", self.api_url);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .json(&json!({
                "title": title,
                "notes": notes,
                "due": normalize_due_date(due_date),
            }))
            .send()
            .await
            .context("Failed to send create task request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("failed to create task: {status} - {body}"));
        }

        let task: CreatedTask = response
            .json()
            .await
            .context("Failed to parse create task response")?;

        debug!(task_id = %task.id, "Created Google Task");
        Ok(task.id)
    }

    /// Update an existing task's title, notes, and due date.
    pub async fn update_task(
        &self,
        access_token: &str,
        task_list_id: &str,
        task_id: &str,
        title: &str,
        notes: &str,
        due_date: &str,
    ) -> Result<()> {
        let url = format!("{}/lists/{task_list_id}/tasks/{task_id}", self.api_url);

        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .json(&json!({
                "title": title,
                "notes": notes,
                "due": normalize_due_date(due_date),
            }))
            .send()
            .await
            .context("Failed to send update task request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("failed to update task: {status} - {body}"));
        }

        Ok(())
    }

    /// Mark a task as completed.
    pub async fn complete_task(
        &self,
        access_token: &str,
        task_list_id: &str,
        task_id: &str,
    ) -> Result<()> {
        let url = format!("{}/lists/{task_list_id}/tasks/{task_id}", self.api_url);

        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .json(&json!({
                "status": "completed",
                "completed": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }))
            .send()
            .await
            .context("Failed to send complete task request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("failed to complete task: {status} - {body}"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_date() {
        assert_eq!(
            normalize_due_date("2025-09-01"),
            "2025-09-01T00:00:00.000Z"
        );
    }

    #[test]
    fn test_normalize_rfc3339_passthrough() {
        assert_eq!(
            normalize_due_date("2025-09-01T12:30:00+09:00"),
            "2025-09-01T12:30:00+09:00"
        );
    }

    #[test]
    fn test_normalize_garbage_passthrough() {
        assert_eq!(normalize_due_date("next tuesday"), "next tuesday");
    }

    #[test]
    fn test_parse_task_lists_response() {
        let json = r#"{
            "kind": "tasks#taskLists",
            "items": [
                { "id": "list-1", "title": "My Tasks", "updated": "2025-08-01T00:00:00.000Z" },
                { "id": "list-2", "title": "Work" }
            ]
        }"#;

        let lists: TaskListsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(lists.items.len(), 2);
        assert_eq!(lists.items[0].id, "list-1");
        assert!(lists.items[1].updated.is_none());
    }

    #[test]
    fn test_parse_empty_task_lists_response() {
        let lists: TaskListsResponse = serde_json::from_str(r#"{"kind":"tasks#taskLists"}"#).unwrap();
        assert!(lists.items.is_empty());
    }
}
