// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bounded retries with exponential backoff
//!
//! Backoff schedule:
//! - 429 (rate limited): 2s, 4s, 8s, ...
//! - 5xx, timeouts, connection failures: 1s, 2s, 4s, ...
//! - everything else: not retried
//!
//! Every delay is capped at `max_backoff`.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::LlmSettings;
use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_backoff: Duration::from_secs(35),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        }
    }

    /// Delay before the attempt following `attempt` (0-based)
    pub fn delay(&self, error: &ProviderError, attempt: u32) -> Duration {
        let exp = match error {
            ProviderError::RateLimited => attempt.saturating_add(1),
            _ => attempt,
        };
        let secs = 2u64.checked_pow(exp).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out
    pub async fn run<T, F, Fut>(&self, context: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!("{}: non-retriable error ({})", context, e);
                    return Err(e);
                }
                Err(e) if attempt + 1 >= attempts => {
                    warn!("{}: failed after {} attempts: {}", context, attempts, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay(&e, attempt);
                    warn!("{}: {}, retrying in {:?}", context, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let server = ProviderError::Server {
            status: 503,
            body: String::new(),
        };
        assert_eq!(policy.delay(&ProviderError::RateLimited, 0), Duration::from_secs(2));
        assert_eq!(policy.delay(&ProviderError::RateLimited, 2), Duration::from_secs(8));
        assert_eq!(policy.delay(&server, 0), Duration::from_secs(1));
        assert_eq!(policy.delay(&server, 3), Duration::from_secs(8));
        assert_eq!(policy.delay(&ProviderError::Timeout, 10), Duration::from_secs(35));
        assert_eq!(policy.delay(&ProviderError::Timeout, 200), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = RetryPolicy::default()
            .run("test", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ProviderError::RateLimited)
                    } else {
                        Ok("Proof. auto. Qed.")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "Proof. auto. Qed.");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::InvalidModel("nope".into())) }
            })
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidModel(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy {
            max_attempts: 3,
            max_backoff: Duration::from_secs(35),
        };
        let result: Result<(), _> = policy
            .run("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Timeout) }
            })
            .await;
        assert_eq!(result, Err(ProviderError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
