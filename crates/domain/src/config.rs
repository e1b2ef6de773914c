//! Environment-driven configuration for the scanner binary.

use std::{env, time::Duration};

use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.etherscan.io/api";
pub const DEFAULT_WINDOW: usize = 100;
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// What a worker does with a height whose fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// `None` re-queues forever.
    pub max_retries: Option<u32>,
    /// Pause taken by the failing worker before the height is re-queued.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn bounded(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries: Some(max_retries),
            backoff,
        }
    }

    /// `failures` counts every failed attempt for the height so far.
    pub fn allows_retry(&self, failures: u32) -> bool {
        match self.max_retries {
            Some(max) => failures <= max,
            None => true,
        }
    }
}

/// Tunables for a scan run. The API credential is not part of it; it comes
/// from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    api_url: String,
    window: usize,
    workers: usize,
    retry: RetryPolicy,
    http_timeout: Duration,
    channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            window: DEFAULT_WINDOW,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::unlimited(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ScanConfig {
    /// Hydrates `.env` (if present) and reads the optional `SCAN_*` knobs.
    /// Missing entries keep their defaults; malformed ones surface as
    /// `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let api_url = get_optional_var("ETHERSCAN_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let window = get_positive("SCAN_WINDOW")?.unwrap_or(DEFAULT_WINDOW);
        let workers = get_positive("SCAN_WORKERS")?.unwrap_or(DEFAULT_WORKERS);
        let channel_capacity =
            get_positive("SCAN_CHANNEL_CAPACITY")?.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let max_retries = get_number::<u32>("SCAN_MAX_RETRIES")?;
        let backoff = get_number::<u64>("SCAN_RETRY_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or_default();
        let http_timeout = match get_number::<u64>("SCAN_HTTP_TIMEOUT_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "SCAN_HTTP_TIMEOUT_SECS",
                    reason: "must be greater than zero",
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_HTTP_TIMEOUT,
        };

        Ok(Self {
            api_url,
            window,
            workers,
            retry: RetryPolicy {
                max_retries,
                backoff,
            },
            http_timeout,
            channel_capacity,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    get_optional_var(key)
        .map(|raw| {
            raw.parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

fn get_positive(key: &'static str) -> Result<Option<usize>, ConfigError> {
    match get_number::<usize>(key)? {
        Some(0) => Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero",
        }),
        other => Ok(other),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("BLOCK_DELTA_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid value in `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
