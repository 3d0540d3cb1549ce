//! Bounded exponential retry.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

/// Retry schedule: `attempts` tries in total, the delay doubling from
/// `initial_delay_ms` up to `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_attempts() -> usize {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Retry an async operation while `retryable` accepts the error.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_async<F, Fut, T, E, R>(mut op: F, policy: RetryPolicy, retryable: R) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.initial_delay_ms).min(max_delay);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.attempts && retryable(&e) => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Request failed, retrying");
                sleep(delay).await;
                delay = delay.saturating_mul(2).min(max_delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_delay_ms: 100,
            max_delay_ms: 250,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, String> = retry_async(
            |_| {
                let current = counter.fetch_add(1, Ordering::Relaxed);
                async move {
                    if current < 2 {
                        Err("flaky".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            policy(4),
            |_| true,
        )
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempts_with_capped_delay() {
        let counter = AtomicUsize::new(0);
        let start = Instant::now();
        let res: Result<(), String> = retry_async(
            |attempt| {
                counter.fetch_add(1, Ordering::Relaxed);
                async move { Err(format!("attempt {attempt}")) }
            },
            policy(4),
            |_| true,
        )
        .await;

        assert_eq!(res.unwrap_err(), "attempt 4");
        assert_eq!(counter.load(Ordering::Relaxed), 4);
        // 100 + 200 + 250
        assert_eq!(start.elapsed(), Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let counter = AtomicUsize::new(0);
        let res: Result<(), String> = retry_async(
            |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Err("bad request".to_string()) }
            },
            policy(5),
            |e| !e.contains("bad request"),
        )
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
