use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::chunker::{Chunker, ChunkerError};
use crate::ingest::RetryPolicy;

const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_TOP_K: usize = 4;
pub(crate) const DEFAULT_MAX_STEPS: usize = 3;
const DEFAULT_EMBED_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;
const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_INGEST_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to deserialize json config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to fetch env var `{0}`")]
    MissingEnvVar(String),
    #[error(transparent)]
    Chunker(#[from] ChunkerError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for ingestion, retrieval and the chat loop.
///
/// Parsed from JSON, every field is optional and unknown fields are rejected:
///
/// ```rust
/// use docchat::config::Config;
///
/// let config = Config::from_json(Some(r#"{ "chunk_size": 500, "top_k": 6 }"#)).unwrap();
/// assert_eq!(config.chunk_size, 500);
/// assert_eq!(config.max_steps, 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters repeated between consecutive chunks, must be below `chunk_size`.
    pub chunk_overlap: usize,
    /// Passages returned per retrieval.
    pub top_k: usize,
    /// Tool calls allowed per chat turn.
    pub max_steps: usize,
    /// Attempts per chunk embedding, including the first one.
    pub embed_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub embed_timeout_secs: u64,
    pub model_timeout_secs: u64,
    /// Documents ingested at once during batch uploads.
    pub ingest_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: 0,
            top_k: DEFAULT_TOP_K,
            max_steps: DEFAULT_MAX_STEPS,
            embed_attempts: DEFAULT_EMBED_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            embed_timeout_secs: DEFAULT_EMBED_TIMEOUT_SECS,
            model_timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
            ingest_concurrency: DEFAULT_INGEST_CONCURRENCY,
        }
    }
}

impl Config {
    /// Parse and validate a JSON config, `None` gives the defaults.
    pub fn from_json(json_config: Option<&str>) -> Result<Self, ConfigError> {
        let config = match json_config {
            Some(json) => serde_json::from_str::<Self>(json).map_err(|e| {
                error!(error = %e, "Failed to deserialize json config");
                ConfigError::from(e)
            })?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunker()?;
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.embed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "embed_attempts must be at least 1".to_string(),
            ));
        }
        if self.ingest_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "ingest_concurrency must be at least 1".to_string(),
            ));
        }
        if self.embed_timeout_secs == 0 || self.model_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn chunker(&self) -> Result<Chunker, ChunkerError> {
        Chunker::new(self.chunk_size, self.chunk_overlap)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.embed_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    #[must_use]
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }

    #[must_use]
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

/// Read an API key from the environment variable `var`.
pub fn api_key_from_env(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|e| {
        error!(var, error = %e, "Failed to fetch env var");
        ConfigError::MissingEnvVar(var.to_string())
    })
}
