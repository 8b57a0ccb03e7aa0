use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;

use crate::error::ConfigError;

pub const DEFAULT_STREAM_MAX_ATTEMPTS: u32 = 20;
pub const DEFAULT_STREAM_RETRY_DELAY_MS: u64 = 500;

const ENV_STREAM_MAX_ATTEMPTS: &str = "VK_HISTORY_STREAM_MAX_ATTEMPTS";
const ENV_STREAM_RETRY_DELAY_MS: &str = "VK_HISTORY_STREAM_RETRY_DELAY_MS";

/// Fixed-delay retry policy for the live log stream of a running process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS, JsonSchema)]
#[schemars(
    title = "Live Stream Retry",
    description = "How often to retry attaching to a running process's log stream"
)]
pub struct StreamRetryConfig {
    #[serde(default = "default_max_attempts")]
    #[schemars(
        title = "Max Attempts",
        description = "Total attempts including the first one. Must be at least 1."
    )]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    #[schemars(
        title = "Retry Delay (milliseconds)",
        description = "Fixed delay between attempts."
    )]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_STREAM_MAX_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    DEFAULT_STREAM_RETRY_DELAY_MS
}

impl Default for StreamRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_STREAM_MAX_ATTEMPTS,
            delay_ms: DEFAULT_STREAM_RETRY_DELAY_MS,
        }
    }
}

impl StreamRetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, TS, JsonSchema)]
pub struct HistoryConfig {
    #[serde(default)]
    pub stream_retry: StreamRetryConfig,
}

impl HistoryConfig {
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_attempts = read_env_u32(
            ENV_STREAM_MAX_ATTEMPTS,
            DEFAULT_STREAM_MAX_ATTEMPTS,
            &get_env,
        );
        let max_attempts = if max_attempts == 0 {
            warn!("{ENV_STREAM_MAX_ATTEMPTS} set to 0. Using minimum value 1.");
            1
        } else {
            max_attempts
        };

        Self {
            stream_retry: StreamRetryConfig {
                max_attempts,
                delay_ms: read_env_u64(
                    ENV_STREAM_RETRY_DELAY_MS,
                    DEFAULT_STREAM_RETRY_DELAY_MS,
                    &get_env,
                ),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream_retry.validate()
    }
}

fn read_env_u32<F>(name: &str, default: u32, get_env: &F) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(name) {
        Some(value) => match value.parse::<u32>() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Invalid {name}='{value}': {err}. Using default {default}.");
                default
            }
        },
        None => default,
    }
}

fn read_env_u64<F>(name: &str, default: u64, get_env: &F) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(name) {
        Some(value) => match value.parse::<u64>() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Invalid {name}='{value}': {err}. Using default {default}.");
                default
            }
        },
        None => default,
    }
}
