use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_EXTRACT_URL: &str = "https://mds-data-1.ciim.k-int.com/api/v1/extract";

/// Backoff settings for transient page failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt before giving up.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Stretch each delay by a random 0-100%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Everything a run needs that is not part of a single command.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: PathBuf,
    pub api_url: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Config {
    pub fn new(store_path: PathBuf) -> Self {
        Config {
            store_path,
            api_url: DEFAULT_EXTRACT_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }
}
