use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // AI provider
    pub anthropic_api_key: String,
    /// Model used for research, verification, scoring, and audit passes.
    pub fast_model: String,
    /// Model used for the writing stage only.
    pub quality_model: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Admin
    pub admin_api_token: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            fast_model: env::var("FAST_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
            quality_model: env::var("QUALITY_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5-20250929".to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            admin_api_token: required_env("ADMIN_API_TOKEN"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
