use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time;
use tracing::warn;

use common::actors::{ShutdownSignal, is_shutdown, wait_for_shutdown};
use common::backoff::Backoff;

/// Result of a retried operation plus the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Bounded exponential retry. `max_retries` counts retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_max_retries(3)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, multiplier: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::new(base_delay, multiplier, max_delay),
        }
    }

    /// 1s base, x4, capped at 60s.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::from_secs(1), 4, Duration::from_secs(60))
    }

    /// Delays slept between attempts, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        self.backoff.iter().take(self.max_retries as usize).collect()
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. A fired shutdown token ends the wait at the
    /// next backoff sleep and returns the last error.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        mut op: F,
        retryable: P,
        shutdown: &mut ShutdownSignal,
    ) -> Attempted<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op(attempts).await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) => err,
            };

            let retries_used = attempts - 1;
            if !retryable(&err) || retries_used >= self.max_retries || is_shutdown(shutdown) {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.backoff.delay(retries_used);
            warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempts,
                self.max_retries + 1,
                err,
                delay
            );

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = wait_for_shutdown(shutdown) => {
                    warn!("Retry abandoned after {} attempts: shutting down", attempts);
                    return Attempted {
                        result: Err(err),
                        attempts,
                    };
                }
            }
        }
    }
}
