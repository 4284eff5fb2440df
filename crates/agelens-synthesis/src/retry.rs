//! Bounded retry around a provider
//!
//! Every attempt runs under a timeout; a timeout counts as a transient
//! failure. Transient failures are retried with exponential backoff until
//! `max_attempts` is reached, then escalated as
//! [`UpstreamError::Exhausted`]. Permanent failures return immediately.

use crate::adapter::SynthesisAdapter;
use crate::error::UpstreamError;
use agelens_model::{AgeStage, Descriptor, ImageBytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and timeout settings for provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first (0 is treated as 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays
    pub backoff_factor: u32,
    /// Deadline for one provider call
    pub attempt_timeout_ms: u64,
}

impl RetryPolicy {
    /// Policy that never retries
    #[inline]
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// With max attempts
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// With attempt timeout
    #[inline]
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = millis(timeout);
        self
    }

    /// Effective attempt count
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Deadline for one provider call
    #[inline]
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay before retry number `retry` (1-based)
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = u64::from(self.backoff_factor.max(1)).saturating_pow(exponent);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_factor: 2,
            attempt_timeout_ms: 90_000,
        }
    }
}

/// Adapter decorator applying a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryingAdapter<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A> RetryingAdapter<A> {
    /// Wrap `inner`
    #[inline]
    #[must_use]
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Active policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Wrapped adapter
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: SynthesisAdapter> SynthesisAdapter for RetryingAdapter<A> {
    async fn generate(
        &self,
        descriptor: &Descriptor,
        stage: AgeStage,
    ) -> Result<ImageBytes, UpstreamError> {
        let attempts = self.policy.attempts();
        let timeout = self.policy.attempt_timeout();
        let mut last = String::new();

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(timeout, self.inner.generate(descriptor, stage)).await;

            last = match outcome {
                Ok(Ok(bytes)) => {
                    if attempt > 1 {
                        tracing::info!(%stage, attempt, "provider call succeeded after retry");
                    }
                    return Ok(bytes);
                }
                Ok(Err(UpstreamError::Permanent(reason))) => {
                    tracing::warn!(%stage, %reason, "provider rejected request");
                    return Err(UpstreamError::Permanent(reason));
                }
                Ok(Err(err)) => err.reason().to_string(),
                Err(_) => format!("timed out after {}ms", timeout.as_millis()),
            };

            if attempt < attempts {
                let delay = self.policy.backoff(attempt);
                tracing::warn!(
                    %stage,
                    attempt,
                    reason = %last,
                    delay_ms = millis(delay),
                    "transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(%stage, attempts, reason = %last, "provider retries exhausted");
        Err(UpstreamError::Exhausted { attempts, last })
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockSynthesisAdapter;
    use agelens_model::DescriptorBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn descriptor() -> Descriptor {
        DescriptorBuilder::new().build("Ava").unwrap()
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            backoff_factor: 2,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
        assert_eq!(
            RetryPolicy::default()
                .with_attempt_timeout(Duration::MAX)
                .attempt_timeout_ms,
            u64::MAX
        );
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).attempts(), 1);
        assert_eq!(RetryPolicy::no_retry().attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);

        let mut mock = MockSynthesisAdapter::new();
        mock.expect_generate().times(2).returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(UpstreamError::transient("overloaded"))
            } else {
                Ok(ImageBytes::from(vec![42u8]))
            }
        });

        let adapter = RetryingAdapter::new(mock, RetryPolicy::default());
        let bytes = adapter.generate(&descriptor(), AgeStage::Teen).await.unwrap();

        assert_eq!(bytes.as_slice(), &[42]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let mut mock = MockSynthesisAdapter::new();
        mock.expect_generate()
            .times(3)
            .returning(|_, _| Err(UpstreamError::transient("503 service unavailable")));

        let adapter = RetryingAdapter::new(mock, RetryPolicy::default().with_max_attempts(3));
        let err = adapter
            .generate(&descriptor(), AgeStage::Adult)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            UpstreamError::Exhausted {
                attempts: 3,
                last: "503 service unavailable".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_is_not_retried() {
        let mut mock = MockSynthesisAdapter::new();
        mock.expect_generate()
            .times(1)
            .returning(|_, _| Err(UpstreamError::permanent("content policy")));

        let adapter = RetryingAdapter::new(mock, RetryPolicy::default().with_max_attempts(5));
        let err = adapter
            .generate(&descriptor(), AgeStage::Child)
            .await
            .unwrap_err();

        assert_eq!(err, UpstreamError::permanent("content policy"));
    }

    struct Hanging;

    #[async_trait]
    impl SynthesisAdapter for Hanging {
        async fn generate(
            &self,
            _descriptor: &Descriptor,
            _stage: AgeStage,
        ) -> Result<ImageBytes, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ImageBytes::from(vec![0u8]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient() {
        let policy = RetryPolicy::default()
            .with_max_attempts(2)
            .with_attempt_timeout(Duration::from_millis(250));
        let adapter = RetryingAdapter::new(Hanging, policy);

        let err = adapter
            .generate(&descriptor(), AgeStage::Infant)
            .await
            .unwrap_err();

        match err {
            UpstreamError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(last, "timed out after 250ms");
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }
}
