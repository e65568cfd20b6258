//! Configuration management for the sprint API
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use sprint_common::{LateCompletionPolicy, SprintPolicy};
use std::env;
use std::time::Duration;

/// Where sprint records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            other => anyhow::bail!("Unknown STORAGE_BACKEND '{}' (expected memory or redis)", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    pub storage_backend: StorageBackend,

    /// Redis connection URL, used with the redis backend
    pub redis_url: String,

    /// Endpoint that receives nudge notifications. Unset means log only.
    pub notify_webhook_url: Option<String>,

    /// Upper bound for a single notification
    pub notify_timeout_secs: u64,

    /// Approve checkpoint submissions without a scout verification step
    pub auto_verify_checkpoints: bool,

    /// Drop finalists who completed after the submission window from scoring
    pub exclude_late_finalists: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            api_host: var("API_HOST", "0.0.0.0"),

            api_port: var("API_PORT", "8090")
                .parse()
                .context("Invalid API_PORT")?,

            storage_backend: var("STORAGE_BACKEND", "memory").parse()?,

            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),

            notify_webhook_url: lookup("NOTIFY_WEBHOOK_URL").filter(|url| !url.trim().is_empty()),

            notify_timeout_secs: var("NOTIFY_TIMEOUT_SECS", "10")
                .parse()
                .context("Invalid NOTIFY_TIMEOUT_SECS")?,

            auto_verify_checkpoints: var("AUTO_VERIFY_CHECKPOINTS", "false")
                .parse()
                .context("Invalid AUTO_VERIFY_CHECKPOINTS (expected true/false)")?,

            exclude_late_finalists: var("EXCLUDE_LATE_FINALISTS", "false")
                .parse()
                .context("Invalid EXCLUDE_LATE_FINALISTS (expected true/false)")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.notify_timeout_secs == 0 {
            anyhow::bail!("NOTIFY_TIMEOUT_SECS must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    /// Sprint policy with the configured switches applied
    pub fn policy(&self) -> SprintPolicy {
        SprintPolicy {
            auto_verify_checkpoints: self.auto_verify_checkpoints,
            late_completions: if self.exclude_late_finalists {
                LateCompletionPolicy::Exclude
            } else {
                LateCompletionPolicy::Include
            },
            ..SprintPolicy::default()
        }
    }
}
