//! Bounded exponential backoff for page requests.
//!
//! Delays between attempts are slept on the runtime and raced against the run's
//! cancellation token, so an interrupt never waits out a backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, FetchError, IsRetryable};

/// Runs `operation` until it succeeds, fails permanently, runs out of retries or the
/// run is cancelled. On success also returns how many retries were spent.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<(T, u32), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut retries = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "page request succeeded after retry");
                }
                return Ok((value, retries));
            }
            Err(e) if e.is_retryable() && retries < config.max_attempts => {
                retries += 1;
                let wait = backoff_delay(config, delay, e.retry_after());

                tracing::warn!(
                    error = %e,
                    attempt = retries,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "page request failed, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Interrupted),
                    _ = tokio::time::sleep(wait) => {}
                }

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_delay);
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(error = %e, attempts = retries + 1, "page request failed after all retries");
                return Err(Error::TransientFetch { attempts: retries + 1, source: e });
            }
            Err(e) => {
                tracing::error!(error = %e, "page request failed permanently");
                return Err(Error::PermanentFetch(e));
            }
        }
    }
}

fn backoff_delay(config: &RetryConfig, delay: Duration, retry_after: Option<Duration>) -> Duration {
    let delay = if config.jitter { add_jitter(delay) } else { delay };
    let delay = delay.min(config.max_delay);
    match retry_after {
        Some(hint) => delay.max(hint),
        None => delay,
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
