//! Exponential backoff for transient engine failures.
//!
//! `RetryPolicy::run` is the generic combinator; `RetryingQbit` applies it to
//! every method of a [`QbitApi`] client, whose REST transport has no resilience
//! of its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::EngineResult;
use crate::model::TransferInfo;
use crate::service::QbitApi;

/// Backoff schedule applied to transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Multiplier applied to the exponential term.
    pub multiplier: u32,
    /// Lower bound for any single delay.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            multiplier: 2,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let seconds = u64::from(self.multiplier).saturating_mul(1_u64 << exponent);
        Duration::from_secs(seconds).clamp(self.min_delay, self.max_delay)
    }

    /// Run `call` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error, or the final transient error once
    /// `max_attempts` calls have failed.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = EngineResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = ?err,
                        "transient engine failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Wrap `client` so every call is retried, unless it already is.
#[must_use]
pub fn with_retry(client: Arc<dyn QbitApi>, policy: RetryPolicy) -> Arc<dyn QbitApi> {
    if client.is_retrying() {
        return client;
    }
    Arc::new(RetryingQbit {
        inner: client,
        policy,
    })
}

/// [`QbitApi`] decorator applying a [`RetryPolicy`] to each call.
pub struct RetryingQbit {
    inner: Arc<dyn QbitApi>,
    policy: RetryPolicy,
}

impl RetryingQbit {
    /// Policy in effect.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl QbitApi for RetryingQbit {
    async fn app_preferences(&self) -> EngineResult<Map<String, Value>> {
        self.policy
            .run("app_preferences", || self.inner.app_preferences())
            .await
    }

    async fn set_preferences(&self, preferences: &Map<String, Value>) -> EngineResult<()> {
        self.policy
            .run("set_preferences", || self.inner.set_preferences(preferences))
            .await
    }

    async fn transfer_info(&self) -> EngineResult<TransferInfo> {
        self.policy
            .run("transfer_info", || self.inner.transfer_info())
            .await
    }

    async fn torrents_stop(&self, hashes: &str) -> EngineResult<()> {
        self.policy
            .run("torrents_stop", || self.inner.torrents_stop(hashes))
            .await
    }

    async fn torrents_delete(&self, hashes: &str, delete_files: bool) -> EngineResult<()> {
        self.policy
            .run("torrents_delete", || {
                self.inner.torrents_delete(hashes, delete_files)
            })
            .await
    }

    async fn close(&self) -> EngineResult<()> {
        self.policy.run("close", || self.inner.close()).await
    }

    fn is_retrying(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn delays_grow_and_clamp() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=6).map(|attempt| policy.delay_for(attempt)).collect();
        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[1], Duration::from_secs(4));
        assert_eq!(delays[3], Duration::from_secs(16));
        assert_eq!(delays[5], Duration::from_secs(30));
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_the_attempt_budget() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: EngineResult<()> = policy
            .run("probe", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(EngineError::Timeout {
                        engine: "qbittorrent",
                        operation: "probe",
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(EngineError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4 + 8 + 16));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_propagate_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: EngineResult<()> = policy
            .run("probe", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EngineError::GidNotFound { gid: None }) }
            })
            .await;

        assert!(matches!(result, Err(EngineError::GidNotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("probe", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(EngineError::Connection {
                            engine: "qbittorrent",
                            message: "refused".into(),
                        })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some(2));
    }

    struct FlakyQbit {
        calls: AtomicU32,
    }

    #[async_trait]
    impl QbitApi for FlakyQbit {
        async fn app_preferences(&self) -> EngineResult<Map<String, Value>> {
            Ok(Map::new())
        }

        async fn set_preferences(&self, _preferences: &Map<String, Value>) -> EngineResult<()> {
            Ok(())
        }

        async fn transfer_info(&self) -> EngineResult<TransferInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Transport {
                engine: "qbittorrent",
                message: "connection reset".into(),
            })
        }

        async fn torrents_stop(&self, _hashes: &str) -> EngineResult<()> {
            Ok(())
        }

        async fn torrents_delete(&self, _hashes: &str, _delete_files: bool) -> EngineResult<()> {
            Ok(())
        }

        async fn close(&self) -> EngineResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wrapping_twice_does_not_multiply_attempts() {
        let flaky = Arc::new(FlakyQbit {
            calls: AtomicU32::new(0),
        });
        let once = with_retry(flaky.clone(), RetryPolicy::default());
        let twice = with_retry(once.clone(), RetryPolicy::default());
        assert!(Arc::ptr_eq(&once, &twice));

        assert!(twice.transfer_info().await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 5);
    }
}
