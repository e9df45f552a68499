use std::env;
use std::time::Duration;

/// Evaluation cadence when EVALUATION_INTERVAL_SECS is unset: 15 minutes.
pub const DEFAULT_EVALUATION_INTERVAL_SECS: u64 = 900;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    MissingVar(&'static str),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub document_store_uri: String,
    pub document_db_name: String,
    pub evaluation_interval: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let document_store_uri =
            env_var_non_empty("MONGODB_URI").ok_or(ConfigError::MissingVar("MONGODB_URI"))?;
        let document_db_name =
            env_var_non_empty("DOCUMENT_DB_NAME").unwrap_or_else(|| "todo".to_string());
        let evaluation_interval = env::var("EVALUATION_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_EVALUATION_INTERVAL_SECS));

        Ok(Self {
            document_store_uri,
            document_db_name,
            evaluation_interval,
        })
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
