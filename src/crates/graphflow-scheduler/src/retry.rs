//! Bounded retry with jittered exponential backoff
//!
//! [`retry`] wraps one message's processing attempt. Retries are
//! per-message: the sleep between attempts suspends only that message's
//! future, never the rest of the batch. With no policy configured a single
//! attempt is made; on exhaustion the last failure surfaces to the caller
//! unchanged.

use crate::error::SchedulerError;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type RetryPredicate = Arc<dyn Fn(&SchedulerError) -> bool + Send + Sync>;

/// Policy describing how a failed attempt is retried
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,

    /// Interval before the first retry, in seconds
    pub initial_interval: f64,

    /// Multiplier applied to the interval after each retry
    pub backoff_factor: f64,

    /// Ceiling on the interval, in seconds
    pub max_interval: f64,

    /// Jitter fraction: each delay is scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]`
    pub jitter: f64,

    /// Predicate over the failure; a rejected failure surfaces immediately
    retry_on: RetryPredicate,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_interval", &self.initial_interval)
            .field("backoff_factor", &self.backoff_factor)
            .field("max_interval", &self.max_interval)
            .field("jitter", &self.jitter)
            .field("retry_on", &"<predicate>")
            .finish()
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget.
    ///
    /// Defaults: 0.5s initial interval, doubling, 128s ceiling, 25% jitter,
    /// every failure retryable.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: 0.25,
            retry_on: Arc::new(|_| true),
        }
    }

    /// Set the interval before the first retry
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the interval ceiling
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Set the jitter fraction (0 disables jitter)
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    /// Restrict which failures are retried
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SchedulerError) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Arc::new(predicate);
        self
    }

    /// Retry only failures classified as transient
    pub fn transient_only(self) -> Self {
        self.retry_on(SchedulerError::is_transient)
    }

    /// Whether the given failure should be retried
    pub fn should_retry(&self, error: &SchedulerError) -> bool {
        (self.retry_on)(error)
    }

    /// Delay before the retry following `attempt` (0-indexed)
    pub fn backoff(&self, attempt: usize) -> Duration {
        let base = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_interval);
        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Run `op` under `policy`.
///
/// `None` means a single attempt. Otherwise `op` is re-invoked until it
/// succeeds, the policy's predicate rejects the failure, or the attempt
/// budget is spent; the last failure is returned on exhaustion.
pub async fn retry<T, F, Fut>(
    policy: Option<&RetryPolicy>,
    mut op: F,
) -> std::result::Result<T, SchedulerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, SchedulerError>>,
{
    let Some(policy) = policy else {
        return op().await;
    };

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !policy.should_retry(&error) {
                    return Err(error);
                }
                let delay = policy.backoff(attempt - 1);
                tracing::debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
