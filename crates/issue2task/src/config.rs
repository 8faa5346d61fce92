//! Configuration for the sync service.

use std::env;

/// Webhook relay configuration, read from the environment.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// GitHub webhook signing secret for signature verification.
    pub webhook_secret: Option<String>,
    /// GitHub App ID used to mint installation access tokens.
    pub github_app_id: Option<String>,
    /// GitHub App private key (PEM).
    pub github_private_key: Option<String>,
    /// Google OAuth client ID.
    pub google_client_id: Option<String>,
    /// Google OAuth client secret.
    pub google_client_secret: Option<String>,
    /// Pinned sync account. When unset, the first configured account (by
    /// creation time) is the sync target.
    pub sync_user_id: Option<String>,
    /// SQLite database URL.
    pub database_url: String,
    /// Public base URL of this deployment, used to build OAuth redirect URIs.
    pub public_base_url: Option<String>,
    /// GitHub REST API base URL.
    pub github_api_url: String,
    /// Google OAuth token endpoint.
    pub google_token_url: String,
    /// Google userinfo endpoint.
    pub google_userinfo_url: String,
    /// Google Tasks API base URL.
    pub google_tasks_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            github_app_id: env::var("GITHUB_APP_ID").ok().filter(|s| !s.is_empty()),
            github_private_key: env::var("GITHUB_APP_PRIVATE_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            google_client_id: env::var("GOOGLE_CLIENT_ID").ok().filter(|s| !s.is_empty()),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            sync_user_id: env::var("SYNC_USER_ID").ok().filter(|s| !s.is_empty()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:issue2task.db".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .ok()
                .map(|s| s.trim_end_matches('/').to_string()),
            github_api_url: env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v2/userinfo".to_string()),
            google_tasks_url: env::var("GOOGLE_TASKS_URL")
                .unwrap_or_else(|_| "https://tasks.googleapis.com/tasks/v1".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = ENV_MUTEX.lock().unwrap();

        env::remove_var("PORT");
        env::remove_var("WEBHOOK_SECRET");
        env::remove_var("DATABASE_URL");
        env::remove_var("SYNC_USER_ID");

        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert!(config.webhook_secret.is_none());
        assert!(config.sync_user_id.is_none());
        assert_eq!(config.database_url, "sqlite:issue2task.db");
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(
            config.google_tasks_url,
            "https://tasks.googleapis.com/tasks/v1"
        );
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();

        env::set_var("PORT", "9000");
        env::set_var("WEBHOOK_SECRET", "test-secret");
        env::set_var("PUBLIC_BASE_URL", "https://sync.example.com/");

        let config = Config::default();
        assert_eq!(config.port, 9000);
        assert_eq!(config.webhook_secret, Some("test-secret".to_string()));
        // Trailing slash is stripped so redirect URIs join cleanly
        assert_eq!(
            config.public_base_url,
            Some("https://sync.example.com".to_string())
        );

        env::remove_var("PORT");
        env::remove_var("WEBHOOK_SECRET");
        env::remove_var("PUBLIC_BASE_URL");
    }

    #[test]
    fn test_empty_secret_is_none() {
        let _lock = ENV_MUTEX.lock().unwrap();

        env::set_var("WEBHOOK_SECRET", "");
        let config = Config::default();
        assert!(config.webhook_secret.is_none());
        env::remove_var("WEBHOOK_SECRET");
    }
}
