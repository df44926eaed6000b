use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    /// Days a freshly registered code stays valid.
    pub code_validity_days: i64,

    /// Days a closed (or expired-and-never-closed) code is kept before the
    /// retention cleaner deletes it.
    pub retention_days: i64,

    /// Cron expression for the retention cleaner trigger.
    pub cleanup_schedule: String,

    /// Maximum rows the cleaner deletes per batch.
    pub cleanup_batch_size: u32,

    /// When false, requests are attributed to the anonymous marker instead
    /// of a token claim.
    pub auth_required: bool,

    /// When true, `all=N` searches also drop codes already past expiry.
    pub search_excludes_expired: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port").unwrap_or(8113),

            code_validity_days: config.get("code_validity_days").unwrap_or(1),
            retention_days: config.get("retention_days").unwrap_or(30),
            cleanup_schedule: config
                .get("cleanup_schedule")
                .unwrap_or_else(|_| "0 0 3 * * *".to_string()),
            cleanup_batch_size: config.get("cleanup_batch_size").unwrap_or(500),

            auth_required: config.get("auth_required").unwrap_or(false),
            search_excludes_expired: config.get("search_excludes_expired").unwrap_or(false),
        })
    }
}
