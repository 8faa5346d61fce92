//! SQLite persistence: issue-task mappings, user settings, and OAuth tokens.

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::debug;

/// A row from the `issue_task_mapping` table.
///
/// At most one mapping exists per issue URL; once created it is never
/// deleted or mutated.
#[derive(Debug, Clone, FromRow)]
pub struct IssueTaskMapping {
    /// Canonical issue URL (unique key)
    pub url: String,
    /// Google Task ID
    pub task_id: String,
    /// Creation timestamp (unix millis)
    pub created_at: i64,
}

/// A row from the `user_settings` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserSettings {
    /// Linked Google account email
    pub user_id: String,
    /// Task list new tasks are created into
    pub selected_task_list_id: String,
    /// Display name of the selected list
    pub selected_task_list_name: Option<String>,
}

/// A row from the `oauth_tokens` table.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthToken {
    /// Linked Google account email
    pub user_id: String,
    /// Bearer access token
    pub access_token: String,
    /// Refresh token; empty string when Google did not return one
    pub refresh_token: String,
    /// Access token expiry (unix millis)
    pub expires_at: i64,
}

/// A linked account, for the settings page.
#[derive(Debug, Clone, FromRow)]
pub struct LinkedAccount {
    /// Linked Google account email
    pub user_id: String,
    /// When the account was linked (unix millis)
    pub created_at: i64,
}

/// Durable store backed by SQLite.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database and run the schema migration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database exists per connection; keep the pool at one
        // so every query sees the same schema.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS issue_task_mapping (
                url TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_settings (
                user_id TEXT PRIMARY KEY,
                selected_task_list_id TEXT NOT NULL,
                selected_task_list_name TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS oauth_tokens (
                user_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up the mapping for an issue URL.
    pub async fn mapping(&self, issue_url: &str) -> Result<Option<IssueTaskMapping>, sqlx::Error> {
        sqlx::query_as(
            "SELECT url, task_id, created_at FROM issue_task_mapping WHERE url = ?",
        )
        .bind(issue_url)
        .fetch_optional(&self.pool)
        .await
    }

    /// Save a mapping, unless one already exists for the URL.
    ///
    /// Returns `true` when the row was inserted; `false` means a concurrent
    /// delivery inserted a mapping first and the caller should re-read it.
    pub async fn save_mapping(&self, issue_url: &str, task_id: &str) -> Result<bool, sqlx::Error> {
        let now = Utc::now().timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO issue_task_mapping (url, task_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(url) DO NOTHING",
        )
        .bind(issue_url)
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Settings for a specific user.
    pub async fn user_settings(&self, user_id: &str) -> Result<Option<UserSettings>, sqlx::Error> {
        sqlx::query_as(
            "SELECT user_id, selected_task_list_id, selected_task_list_name
             FROM user_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Settings for the first configured account, by creation time.
    pub async fn first_user_settings(&self) -> Result<Option<UserSettings>, sqlx::Error> {
        sqlx::query_as(
            "SELECT user_id, selected_task_list_id, selected_task_list_name
             FROM user_settings ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
    }

    /// Upsert a user's task list selection.
    pub async fn save_user_settings(
        &self,
        user_id: &str,
        task_list_id: &str,
        task_list_name: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO user_settings
                 (user_id, selected_task_list_id, selected_task_list_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 selected_task_list_id = excluded.selected_task_list_id,
                 selected_task_list_name = excluded.selected_task_list_name,
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(task_list_id)
        .bind(task_list_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(user_id = %user_id, task_list_id = %task_list_id, "Saved task list selection");
        Ok(())
    }

    /// OAuth tokens for a user.
    pub async fn oauth_token(&self, user_id: &str) -> Result<Option<OAuthToken>, sqlx::Error> {
        sqlx::query_as(
            "SELECT user_id, access_token, refresh_token, expires_at
             FROM oauth_tokens WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Upsert a user's OAuth tokens after a consent exchange.
    pub async fn save_oauth_token(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO oauth_tokens
                 (user_id, access_token, refresh_token, expires_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 expires_at = excluded.expires_at,
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a refreshed access token.
    pub async fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        expires_at: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "UPDATE oauth_tokens
             SET access_token = ?, expires_at = ?, updated_at = ?
             WHERE user_id = ?",
        )
        .bind(access_token)
        .bind(expires_at)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All linked accounts, newest first.
    pub async fn linked_accounts(&self) -> Result<Vec<LinkedAccount>, sqlx::Error> {
        sqlx::query_as(
            "SELECT user_id, created_at FROM oauth_tokens ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_mapping_roundtrip() {
        let store = memory_store().await;
        let url = "https://github.com/acme/repo/issues/1";

        assert!(store.mapping(url).await.unwrap().is_none());

        let inserted = store.save_mapping(url, "task-abc").await.unwrap();
        assert!(inserted);

        let mapping = store.mapping(url).await.unwrap().unwrap();
        assert_eq!(mapping.task_id, "task-abc");
        assert!(mapping.created_at > 0);
    }

    #[tokio::test]
    async fn test_save_mapping_is_conditional() {
        let store = memory_store().await;
        let url = "https://github.com/acme/repo/issues/2";

        assert!(store.save_mapping(url, "task-first").await.unwrap());
        // Second insert loses the race; existing mapping wins
        assert!(!store.save_mapping(url, "task-second").await.unwrap());

        let mapping = store.mapping(url).await.unwrap().unwrap();
        assert_eq!(mapping.task_id, "task-first");
    }

    #[tokio::test]
    async fn test_first_user_settings_ordering() {
        let store = memory_store().await;

        store
            .save_user_settings("first@example.com", "list-1", Some("My Tasks"))
            .await
            .unwrap();
        // Force a later created_at
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .save_user_settings("second@example.com", "list-2", None)
            .await
            .unwrap();

        let first = store.first_user_settings().await.unwrap().unwrap();
        assert_eq!(first.user_id, "first@example.com");
        assert_eq!(first.selected_task_list_id, "list-1");
    }

    #[tokio::test]
    async fn test_settings_upsert_replaces_selection() {
        let store = memory_store().await;

        store
            .save_user_settings("user@example.com", "list-1", Some("My Tasks"))
            .await
            .unwrap();
        store
            .save_user_settings("user@example.com", "list-2", Some("Work"))
            .await
            .unwrap();

        let settings = store.user_settings("user@example.com").await.unwrap().unwrap();
        assert_eq!(settings.selected_task_list_id, "list-2");
        assert_eq!(settings.selected_task_list_name.as_deref(), Some("Work"));
    }

    #[tokio::test]
    async fn test_oauth_token_refresh_update() {
        let store = memory_store().await;

        store
            .save_oauth_token("user@example.com", "old-token", "refresh", 1000)
            .await
            .unwrap();
        store
            .update_access_token("user@example.com", "new-token", 2000)
            .await
            .unwrap();

        let token = store.oauth_token("user@example.com").await.unwrap().unwrap();
        assert_eq!(token.access_token, "new-token");
        assert_eq!(token.expires_at, 2000);
        assert_eq!(token.refresh_token, "refresh");
    }

    #[tokio::test]
    async fn test_linked_accounts_newest_first() {
        let store = memory_store().await;

        store
            .save_oauth_token("older@example.com", "t1", "r1", 1000)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .save_oauth_token("newer@example.com", "t2", "r2", 1000)
            .await
            .unwrap();

        let accounts = store.linked_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].user_id, "newer@example.com");
    }
}
