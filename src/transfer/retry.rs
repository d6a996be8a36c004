//! Bounded retry with a fixed delay, shared by the download and upload phases.
//!
//! A failed attempt is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - remote status, network and timeout errors
//! - [`FailureType::Permanent`] - policy or local errors that retrying cannot fix
//! - [`FailureType::Cancelled`] - the caller gave up; stop immediately
//!
//! [`RetryPolicy::run`] drives an operation through that classification,
//! sleeping a fixed delay between attempts. Each phase gets its own run, so a
//! download that spends its budget never eats into the upload budget.
//!
//! # Example
//!
//! ```
//! use mediarelay_core::transfer::{FailureType, RetryDecision, RetryPolicy, TransferError, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = TransferError::remote("https://example.com/file.mp4", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => println!("retrying in {delay:?} (attempt {attempt})"),
//!     RetryDecision::DoNotRetry { reason } => println!("not retrying: {reason}"),
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use super::error::TransferError;
use super::progress::Phase;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on another attempt.
    Transient,
    /// Will fail the same way on every attempt.
    Permanent,
    /// The caller cancelled; no further attempts.
    Cancelled,
}

/// Decision on whether to run another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run another attempt after `delay`.
    Retry {
        /// How long to wait first.
        delay: Duration,
        /// The attempt number about to run (1-indexed).
        attempt: u32,
    },
    /// Stop and surface the error.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Attempt bookkeeping handed to each run of the operation.
///
/// Created fresh for every [`RetryPolicy::run`] call; never shared between
/// phases or requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Current attempt (1-indexed).
    pub attempt: u32,
    /// Attempt budget for this operation.
    pub max_attempts: u32,
    /// Delay applied before the next attempt.
    pub backoff: Duration,
}

/// Fixed-delay retry budget.
///
/// # Default Values
///
/// - `max_attempts`: 3 (including the initial attempt)
/// - `delay`: 5 seconds between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Creates a policy with a custom attempt budget and the default delay.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(max_attempts, DEFAULT_RETRY_DELAY)
    }

    /// Attempt budget, including the first attempt.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides what to do after `attempt` (1-indexed) failed.
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::Cancelled => {
                return RetryDecision::DoNotRetry {
                    reason: "transfer cancelled".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, is cancelled or
    /// spends the budget.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Cancelled`] as soon as `cancel` fires, including
    ///   during the delay between attempts
    /// - the attempt's own error for permanent failures
    /// - [`TransferError::ExhaustedRetries`] after `max_attempts` transient
    ///   failures
    #[instrument(skip(self, cancel, operation), fields(phase = %phase))]
    pub async fn run<T, F, Fut>(
        &self,
        phase: Phase,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, TransferError>
    where
        F: FnMut(RetryState) -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let state = RetryState {
                attempt,
                max_attempts: self.max_attempts,
                backoff: self.delay,
            };
            debug!(attempt, "starting attempt");

            let error = match operation(state).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            match self.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        attempt = next_attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying {phase}"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(TransferError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, error = %error, "not retrying {phase}");
                    return Err(match failure_type {
                        FailureType::Transient => TransferError::exhausted(phase, attempt, error),
                        FailureType::Cancelled => TransferError::Cancelled,
                        FailureType::Permanent => error,
                    });
                }
            }
        }
    }
}

/// Classifies a transfer error for retry decisions.
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | RemoteError | Transient | Any status may clear up on a fresh GET |
/// | Network | Transient | Connection may recover |
/// | Timeout | Transient | Attempt ceiling hit; a new attempt gets a new clock |
/// | SinkRejected | Permanent | Same payload, same capability limit |
/// | SizeExceeded | Permanent | Policy decision, not a fault |
/// | Io | Permanent | Local disk problem |
/// | InvalidUrl | Permanent | Won't parse next time either |
/// | ExhaustedRetries | Permanent | Budget already spent |
/// | Cancelled | Cancelled | Stop now |
#[must_use]
pub fn classify_error(error: &TransferError) -> FailureType {
    match error {
        TransferError::RemoteError { .. }
        | TransferError::Network { .. }
        | TransferError::Timeout { .. } => FailureType::Transient,

        TransferError::Cancelled => FailureType::Cancelled,

        TransferError::SinkRejected { .. }
        | TransferError::SizeExceeded { .. }
        | TransferError::Io { .. }
        | TransferError::InvalidUrl { .. }
        | TransferError::ExhaustedRetries { .. } => FailureType::Permanent,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn failing_until(
        successes_after: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut(RetryState) -> std::future::Ready<Result<u32, TransferError>> {
        move |state| {
            calls.fetch_add(1, Ordering::SeqCst);
            if state.attempt > successes_after {
                std::future::ready(Ok(state.attempt))
            } else {
                std::future::ready(Err(TransferError::remote("https://example.com/f", 500)))
            }
        }
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
    }

    #[test]
    fn test_should_retry_delay_is_fixed() {
        let policy = RetryPolicy::new(5, Duration::from_secs(5));
        for attempt in 1..4 {
            assert_eq!(
                policy.should_retry(FailureType::Transient, attempt),
                RetryDecision::Retry {
                    delay: Duration::from_secs(5),
                    attempt: attempt + 1
                }
            );
        }
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { .. }
        ));
        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(matches!(&decision, RetryDecision::DoNotRetry { reason } if reason.contains("exhausted")));
    }

    #[test]
    fn test_should_retry_permanent_and_cancelled_stop() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Cancelled, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_classify_transient_errors() {
        assert_eq!(
            classify_error(&TransferError::remote("u", 500)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&TransferError::remote("u", 404)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&TransferError::timeout("u")),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&TransferError::network("u", "connection reset")),
            FailureType::Transient
        );
    }

    #[test]
    fn test_classify_permanent_errors() {
        assert_eq!(
            classify_error(&TransferError::sink_rejected("too big")),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&TransferError::size_exceeded(1, 2)),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&TransferError::invalid_url("nope")),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&TransferError::Cancelled),
            FailureType::Cancelled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_succeeds_after_max_minus_one_failures_with_that_many_delays() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = policy
            .run(
                Phase::Download,
                &CancellationToken::new(),
                failing_until(2, Arc::clone(&calls)),
            )
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_always_failing_exhausts_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = policy
            .run(
                Phase::Download,
                &CancellationToken::new(),
                failing_until(u32::MAX, Arc::clone(&calls)),
            )
            .await;

        match result {
            Err(TransferError::ExhaustedRetries {
                phase,
                attempts,
                last,
            }) => {
                assert_eq!(phase, Phase::Download);
                assert_eq!(attempts, 3);
                assert!(matches!(*last, TransferError::RemoteError { status: 500, .. }));
            }
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two delays between three attempts, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_permanent_error_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = policy
            .run(Phase::Upload, &CancellationToken::new(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(TransferError::sink_rejected("file too large")))
            })
            .await;

        assert!(matches!(result, Err(TransferError::SinkRejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancel_during_delay_stops_immediately() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = policy
            .run(
                Phase::Download,
                &cancel,
                failing_until(u32::MAX, Arc::clone(&calls)),
            )
            .await;

        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_pre_cancelled_token_never_calls_operation() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .run(Phase::Upload, &cancel, failing_until(0, Arc::clone(&calls)))
            .await;

        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
