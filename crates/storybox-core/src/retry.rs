//! Retry with exponential backoff and jitter.
//!
//! The original engine retried exactly one path (HTTP 429 on image
//! generation) with a fixed attempt count; here the same pattern is a shared
//! helper applied to every external generation call.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay between retries in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for retry logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3).
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 30000).
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// How a retry loop should treat a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Not retryable; propagate the error.
    Stop,
    /// Retryable; wait the exponential backoff delay.
    Backoff,
    /// Retryable; the provider suggested an exact delay in ms.
    After(u64),
}

/// Calculate exponential backoff delay with symmetric jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 ± jitter)`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_ms(attempt: u32, config: &RetryConfig) -> u64 {
    let exp = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_delay_ms);
    let jitter = rand::rng().random_range(-config.jitter_factor..=config.jitter_factor);
    let delayed = (exp as f64 * (1.0 + jitter)).max(0.0);
    delayed as u64
}

/// Run `op` until it succeeds, the decision says stop, or retries run out.
///
/// `decide` classifies each error; the final error is returned unchanged when
/// the loop gives up.
pub async fn retry_with_backoff<T, E, F, Fut, D>(
    config: &RetryConfig,
    decide: D,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: Fn(&E) -> RetryDecision,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_retries {
                    return Err(err);
                }
                let delay_ms = match decide(&err) {
                    RetryDecision::Stop => return Err(err),
                    RetryDecision::Backoff => backoff_delay_ms(attempt, config),
                    RetryDecision::After(ms) => ms,
                };
                debug!(attempt, delay_ms, "retrying after failure");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_caps() {
        let config = RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        };
        assert_eq!(backoff_delay_ms(0, &config), 1000);
        assert_eq!(backoff_delay_ms(1, &config), 2000);
        assert_eq!(backoff_delay_ms(10, &config), config.max_delay_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            &config,
            |_| RetryDecision::Backoff,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err("busy") } else { Ok(n) } }
            },
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stop_decision_fails_immediately() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            &config,
            |_| RetryDecision::Stop,
            || {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let config = RetryConfig {
            max_retries: 2,
            ..RetryConfig::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with_backoff(
            &config,
            |_| RetryDecision::After(10),
            || {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                async { Err("busy") }
            },
        )
        .await;
        assert_eq!(result, Err("busy"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
