//! Retry with backoff
//!
//! Generic resilience wrapper for fallible async reads (counter store,
//! device polls, notification delivery). A [`RetryPolicy`] is built once
//! per call site; [`execute`] runs an operation under it and reports a
//! [`RetryResult`] carrying the value or a [`RetryFailure`] plus a
//! [`RetryContext`] describing what happened.
//!
//! Delays are awaited with `tokio::select!` against the caller's
//! [`CancellationToken`], so cancellation during a wait stops the loop
//! immediately without another attempt.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::failure::{Classified, FailureCategory, FailureClassification};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Decides whether a classified failure is worth another attempt.
pub type ShouldRetryFn = Arc<dyn Fn(&FailureClassification) -> bool + Send + Sync>;

/// Observer invoked before each wait: `(attempt, failure, delay)`.
pub type OnRetryFn =
    Arc<dyn Fn(u32, &FailureClassification, Duration) -> Result<(), BoxError> + Send + Sync>;

/// Backoff strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// `base_delay` every time
    Fixed,
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`
    Exponential,
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("Fixed"),
            Self::Linear => f.write_str("Linear"),
            Self::Exponential => f.write_str("Exponential"),
        }
    }
}

/// Serializable retry knobs, as they appear in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt (0 = single attempt).
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub strategy: RetryStrategy,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            strategy: RetryStrategy::Exponential,
            jitter_factor: 0.1,
        }
    }
}

impl RetrySettings {
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            strategy: RetryStrategy::Exponential,
            jitter_factor: 0.2,
        }
    }
}

/// Immutable retry configuration for one call site.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` means exactly one attempt.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
    /// Clamped to `[0, 1]`.
    pub jitter_factor: f64,
    should_retry: ShouldRetryFn,
    on_retry: Option<OnRetryFn>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("strategy", &self.strategy)
            .field("jitter_factor", &self.jitter_factor)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

const DEVICE_RETRYABLE: &[FailureCategory] = &[
    FailureCategory::Timeout,
    FailureCategory::ConnectionRefused,
    FailureCategory::ConnectionReset,
    FailureCategory::ConnectionAborted,
    FailureCategory::NetworkUnreachable,
    FailureCategory::HostUnreachable,
    FailureCategory::TryAgain,
];

const NETWORK_RETRYABLE: &[FailureCategory] = &[
    FailureCategory::Timeout,
    FailureCategory::ConnectionRefused,
    FailureCategory::ConnectionReset,
    FailureCategory::ConnectionAborted,
    FailureCategory::NetworkUnreachable,
    FailureCategory::HostUnreachable,
];

impl RetryPolicy {
    /// Policy that retries every failure. Narrow it with
    /// [`with_should_retry`](Self::with_should_retry) or use a preset.
    pub fn new(strategy: RetryStrategy) -> Self {
        let defaults = RetrySettings::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay: Duration::from_millis(defaults.base_delay_ms),
            max_delay: Duration::from_millis(defaults.max_delay_ms),
            strategy,
            jitter_factor: 0.0,
            should_retry: Arc::new(|_| true),
            on_retry: None,
        }
    }

    /// Device/counter-store reads: retries link-level and try-again
    /// failures, never permission or invalid-argument failures.
    pub fn device_io() -> Self {
        Self::from_settings(&RetrySettings::default()).retrying_categories(DEVICE_RETRYABLE)
    }

    /// Network/HTTP calls: retries timeout, connection and network
    /// failures, never malformed requests or auth failures.
    pub fn network() -> Self {
        Self::from_settings(&RetrySettings::network()).retrying_categories(NETWORK_RETRYABLE)
    }

    /// Device policy with timings taken from configuration.
    pub fn device_io_from(settings: &RetrySettings) -> Self {
        Self::from_settings(settings).retrying_categories(DEVICE_RETRYABLE)
    }

    /// Network policy with timings taken from configuration.
    pub fn network_from(settings: &RetrySettings) -> Self {
        Self::from_settings(settings).retrying_categories(NETWORK_RETRYABLE)
    }

    fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.strategy)
            .with_max_attempts(settings.max_attempts)
            .with_base_delay(Duration::from_millis(settings.base_delay_ms))
            .with_max_delay(Duration::from_millis(settings.max_delay_ms))
            .with_jitter_factor(settings.jitter_factor)
    }

    fn retrying_categories(self, categories: &'static [FailureCategory]) -> Self {
        self.with_should_retry(move |failure| categories.contains(&failure.category))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = if jitter_factor.is_finite() {
            jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_should_retry(
        mut self,
        should_retry: impl Fn(&FailureClassification) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Arc::new(should_retry);
        self
    }

    pub fn with_on_retry(
        mut self,
        on_retry: impl Fn(u32, &FailureClassification, Duration) -> Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(on_retry));
        self
    }

    pub fn should_retry(&self, failure: &FailureClassification) -> bool {
        (self.should_retry)(failure)
    }

    /// Total invocations allowed: the first attempt plus `max_attempts` retries.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Strategy delay for `attempt` (1-based) before jitter, capped at `max_delay`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let attempt = attempt.max(1);

        let raw = match self.strategy {
            RetryStrategy::Fixed => base,
            RetryStrategy::Linear => base * f64::from(attempt),
            RetryStrategy::Exponential => base * 2f64.powi((attempt - 1).min(62) as i32),
        };

        Duration::from_secs_f64(clamp_secs(raw, max))
    }

    /// Delay before the retry following failed `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let unit = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.jittered_delay(attempt, unit)
    }

    /// Jitter with an explicit `unit` in `[-1, 1]`; the result is clamped
    /// to `[0, max_delay]` so a full-strength negative swing never goes
    /// below zero.
    pub fn jittered_delay(&self, attempt: u32, unit: f64) -> Duration {
        let delay = self.base_delay_for(attempt).as_secs_f64();
        let jitter = delay * self.jitter_factor * unit.clamp(-1.0, 1.0);
        Duration::from_secs_f64(clamp_secs(delay + jitter, self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::device_io()
    }
}

fn clamp_secs(value: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return max.max(0.0);
    }
    value.clamp(0.0, max.max(0.0))
}

/// Ordered summary of a retried execution.
///
/// Serializes as `{MaxAttempts, Strategy, ActualAttempts, Success}` and
/// adds `CancelledDuringDelay: true` only when a wait was interrupted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryContext {
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    pub actual_attempts: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled_during_delay: bool,
}

impl RetryContext {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            strategy: policy.strategy,
            actual_attempts: 0,
            success: false,
            cancelled_during_delay: false,
        }
    }

    /// Context entries in insertion order.
    pub fn entries(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut entries = vec![
            ("MaxAttempts", serde_json::Value::from(self.max_attempts)),
            ("Strategy", serde_json::Value::from(self.strategy.to_string())),
            ("ActualAttempts", serde_json::Value::from(self.actual_attempts)),
            ("Success", serde_json::Value::from(self.success)),
        ];
        if self.cancelled_during_delay {
            entries.push(("CancelledDuringDelay", serde_json::Value::from(true)));
        }
        entries
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }
}

/// Why a retried execution gave up.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: E },
    /// The policy refused to retry this error.
    NotRetryable { attempts: u32, error: E },
    /// The caller's token fired, either while waiting or observed by the
    /// operation itself.
    Cancelled {
        attempts: u32,
        last_error: Option<E>,
        cancelled_during_delay: bool,
    },
}

impl<E> RetryFailure<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::NotRetryable { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::NotRetryable { error, .. } => Some(error),
            Self::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempt(s): {}", attempts, last_error),
            Self::NotRetryable { attempts, error } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempts, error)
            }
            Self::Cancelled {
                attempts,
                cancelled_during_delay,
                ..
            } => {
                if *cancelled_during_delay {
                    write!(f, "cancelled while waiting after {} attempt(s)", attempts)
                } else {
                    write!(f, "cancelled on attempt {}", attempts)
                }
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryFailure<E> {}

/// Outcome of [`execute`]: the value or failure, plus the context.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub outcome: Result<T, RetryFailure<E>>,
    pub context: RetryContext,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&RetryFailure<E>> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, RetryFailure<E>> {
        self.outcome
    }
}

/// Execute an async operation under `policy`.
///
/// `operation` receives a clone of `cancel` so it can observe shutdown
/// itself. A cancellation-shaped failure while `cancel` has fired ends
/// the loop; the same failure without the token firing is an internal
/// timeout and is offered to the policy as [`FailureCategory::Timeout`].
///
/// # Example
/// ```ignore
/// let result = retry::execute(
///     "get_current_rate",
///     &RetryPolicy::device_io(),
///     &token,
///     |_| counters.get_current_rate("ADAM-01", 0, 5),
/// ).await;
/// ```
pub async fn execute<T, E, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classified + fmt::Display,
{
    let mut context = RetryContext::new(policy);
    let mut attempt: u32 = 1;

    loop {
        context.actual_attempts = attempt;

        let err = match operation(cancel.clone()).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                context.success = true;
                return RetryResult {
                    outcome: Ok(value),
                    context,
                };
            }
            Err(err) => err,
        };

        let mut classification = err.classification();

        if classification.is_cancellation() {
            if cancel.is_cancelled() {
                info!(operation = operation_name, attempt, "Operation cancelled by caller");
                return RetryResult {
                    outcome: Err(RetryFailure::Cancelled {
                        attempts: attempt,
                        last_error: Some(err),
                        cancelled_during_delay: false,
                    }),
                    context,
                };
            }
            classification.category = FailureCategory::Timeout;
        }

        if !policy.should_retry(&classification) {
            warn!(
                operation = operation_name,
                attempt,
                category = %classification.category,
                error = %err,
                "Operation failed with non-retryable error"
            );
            return RetryResult {
                outcome: Err(RetryFailure::NotRetryable {
                    attempts: attempt,
                    error: err,
                }),
                context,
            };
        }

        if attempt >= policy.total_attempts() {
            warn!(
                operation = operation_name,
                attempt,
                max_attempts = policy.max_attempts,
                error = %err,
                "Operation failed permanently"
            );
            return RetryResult {
                outcome: Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last_error: err,
                }),
                context,
            };
        }

        let delay = policy.delay_for(attempt);
        notify_on_retry(policy, operation_name, attempt, &classification, delay);

        warn!(
            operation = operation_name,
            attempt,
            max_attempts = policy.max_attempts,
            category = %classification.category,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "Transient failure, retrying"
        );
        metrics::counter!("oee_retry_attempts_total", "operation" => operation_name.to_string())
            .increment(1);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(operation = operation_name, attempt, "Retry wait cancelled");
                context.cancelled_during_delay = true;
                return RetryResult {
                    outcome: Err(RetryFailure::Cancelled {
                        attempts: attempt,
                        last_error: Some(err),
                        cancelled_during_delay: true,
                    }),
                    context,
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

/// Callback failures and panics are logged and never abort the loop.
fn notify_on_retry(
    policy: &RetryPolicy,
    operation_name: &str,
    attempt: u32,
    failure: &FailureClassification,
    delay: Duration,
) {
    let Some(on_retry) = policy.on_retry.as_ref() else {
        return;
    };

    match catch_unwind(AssertUnwindSafe(|| on_retry(attempt, failure, delay))) {
        Ok(Ok(())) => debug!(operation = operation_name, attempt, "on_retry callback completed"),
        Ok(Err(e)) => warn!(
            operation = operation_name,
            attempt,
            error = %e,
            "on_retry callback failed, continuing"
        ),
        Err(_) => warn!(
            operation = operation_name,
            attempt,
            "on_retry callback panicked, continuing"
        ),
    }
}

/// A policy bound to a cancellation token, shared by a service's reads.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, operation: F) -> RetryResult<T, E>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classified + fmt::Display,
    {
        execute(operation_name, &self.policy, &self.cancel, operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn recording_policy(policy: RetryPolicy) -> (RetryPolicy, Arc<Mutex<Vec<Duration>>>) {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let sink = delays.clone();
        let policy = policy.with_on_retry(move |_, _, delay| {
            sink.lock().unwrap().push(delay);
            Ok(())
        });
        (policy, delays)
    }

    fn refused() -> FailureClassification {
        FailureClassification::from_io_error(&std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_strategy_waits_base_delay_between_attempts() {
        let (policy, delays) = recording_policy(
            RetryPolicy::new(RetryStrategy::Fixed)
                .with_max_attempts(5)
                .with_base_delay(Duration::from_millis(100))
                .with_jitter_factor(0.0),
        );
        let calls = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let cancel = CancellationToken::new();
        let result: RetryResult<(), _> = execute("always_fails", &policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FailureClassification::timeout("read timed out")) }
        })
        .await;

        assert!(result.is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        let delays = delays.lock().unwrap();
        assert_eq!(delays.len(), 5);
        assert!(delays.iter().all(|d| *d == Duration::from_millis(100)));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(matches!(
            result.failure(),
            Some(RetryFailure::Exhausted { attempts: 6, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn device_policy_retries_connection_refused() {
        let policy = RetryPolicy::device_io()
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let cancel = CancellationToken::new();
        let result: RetryResult<(), _> = execute("poll_device", &policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(refused()) }
        })
        .await;

        assert!(result.is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.context.actual_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn device_policy_does_not_retry_permission_denied() {
        let policy = RetryPolicy::device_io().with_max_attempts(4);
        let calls = AtomicU32::new(0);

        let cancel = CancellationToken::new();
        let result: RetryResult<(), _> = execute("poll_device", &policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "permission denied",
                ))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.failure(),
            Some(RetryFailure::NotRetryable { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn network_policy_does_not_retry_bad_request() {
        let policy = RetryPolicy::network().with_max_attempts(2);
        let calls = AtomicU32::new(0);

        let cancel = CancellationToken::new();
        let result: RetryResult<(), _> = execute("publish", &policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FailureClassification::from_message("Bad request format")) }
        })
        .await;

        assert!(result.is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_policy_retries_timeout_messages() {
        let policy = RetryPolicy::network()
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(5));
        let calls = AtomicU32::new(0);

        let result = execute("publish", &policy, &CancellationToken::new(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FailureClassification::from_message("The operation has timed out"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(result.value(), Some(&1));
        assert_eq!(result.context.actual_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_delays_are_capped() {
        let (policy, delays) = recording_policy(
            RetryPolicy::new(RetryStrategy::Exponential)
                .with_max_attempts(10)
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(500))
                .with_jitter_factor(0.0),
        );

        let cancel = CancellationToken::new();
        let result: RetryResult<(), _> = execute("capped", &policy, &cancel, |_| async {
            Err(FailureClassification::timeout("slow"))
        })
        .await;

        assert!(result.is_failure());
        let delays = delays.lock().unwrap();
        assert_eq!(delays.len(), 10);
        for window in delays.windows(2) {
            assert!(window[1] >= window[0], "delays must not decrease");
        }
        for delay in &delays[5..] {
            assert_eq!(*delay, Duration::from_millis(500));
        }
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[2], Duration::from_millis(400));
    }

    #[tokio::test]
    async fn success_on_first_attempt_populates_context() {
        let policy = RetryPolicy::device_io();
        let result = execute("ok", &policy, &CancellationToken::new(), |_| async {
            Ok::<_, FailureClassification>(42)
        })
        .await;

        assert!(result.is_success());
        assert_eq!(result.value(), Some(&42));
        assert_eq!(
            result.context.keys(),
            vec!["MaxAttempts", "Strategy", "ActualAttempts", "Success"]
        );
        assert_eq!(result.context.get("ActualAttempts"), Some(serde_json::json!(1)));
        assert_eq!(result.context.get("Success"), Some(serde_json::json!(true)));
        assert_eq!(result.context.get("MaxAttempts"), Some(serde_json::json!(3)));
        assert_eq!(
            result.context.get("Strategy"),
            Some(serde_json::json!("Exponential"))
        );
        assert_eq!(result.context.get("CancelledDuringDelay"), None);
    }

    #[tokio::test]
    async fn zero_max_attempts_means_single_invocation() {
        let policy = RetryPolicy::new(RetryStrategy::Fixed).with_max_attempts(0);
        let calls = AtomicU32::new(0);

        let cancel = CancellationToken::new();
        let result: RetryResult<(), _> = execute("once", &policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FailureClassification::timeout("nope")) }
        })
        .await;

        assert!(result.is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.context.actual_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_stops_immediately() {
        let policy = RetryPolicy::new(RetryStrategy::Fixed)
            .with_max_attempts(5)
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(10));
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            canceller.cancel();
        });

        let counter = calls.clone();
        let result: RetryResult<(), _> = execute("cancel_me", &policy, &token, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(FailureClassification::timeout("slow device")) }
        })
        .await;

        assert!(result.is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.context.actual_attempts, 2);
        assert!(result.context.cancelled_during_delay);
        assert_eq!(
            result.context.get("CancelledDuringDelay"),
            Some(serde_json::json!(true))
        );
        assert!(matches!(
            result.failure(),
            Some(RetryFailure::Cancelled {
                attempts: 2,
                cancelled_during_delay: true,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn internal_timeout_cancellation_is_retried() {
        let policy = RetryPolicy::device_io()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = execute("internal_timeout", &policy, &CancellationToken::new(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FailureClassification::cancelled("operation was canceled"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn caller_cancellation_observed_by_operation_is_not_retried() {
        let policy = RetryPolicy::device_io().with_max_attempts(3);
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: RetryResult<(), _> = execute("observed_cancel", &policy, &token, |t| {
            calls.fetch_add(1, Ordering::SeqCst);
            t.cancel();
            async { Err(FailureClassification::cancelled("operation was canceled")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.failure(),
            Some(RetryFailure::Cancelled {
                cancelled_during_delay: false,
                ..
            })
        ));
        assert!(!result.context.cancelled_during_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_callback_does_not_abort_retries() {
        let policy = RetryPolicy::new(RetryStrategy::Fixed)
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(1))
            .with_on_retry(|_, _, _| Err("callback exploded".into()));
        let calls = AtomicU32::new(0);

        let cancel = CancellationToken::new();
        let result: RetryResult<(), _> = execute("callback_err", &policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FailureClassification::timeout("slow")) }
        })
        .await;

        assert!(result.is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_abort_retries() {
        let policy = RetryPolicy::new(RetryStrategy::Fixed)
            .with_max_attempts(1)
            .with_base_delay(Duration::from_millis(1))
            .with_on_retry(|_, _, _| panic!("observer bug"));
        let calls = AtomicU32::new(0);

        let result = execute("callback_panic", &policy, &CancellationToken::new(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FailureClassification::timeout("slow"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn jitter_never_produces_negative_or_oversized_delay() {
        let policy = RetryPolicy::new(RetryStrategy::Fixed)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(150))
            .with_jitter_factor(1.0);

        assert_eq!(policy.jittered_delay(1, -1.0), Duration::ZERO);
        assert_eq!(policy.jittered_delay(1, 1.0), Duration::from_millis(150));

        for _ in 0..500 {
            let delay = policy.delay_for(1);
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn jitter_bounds_hold_for_random_factors() {
        for factor in [0.0, 0.25, 0.5, 1.0] {
            let policy = RetryPolicy::new(RetryStrategy::Linear)
                .with_base_delay(Duration::from_millis(50))
                .with_max_delay(Duration::from_secs(1))
                .with_jitter_factor(factor);
            for attempt in 1..=5 {
                let scaled = policy.base_delay_for(attempt).as_secs_f64();
                let upper = (scaled * (1.0 + factor)).min(1.0) + 1e-9;
                let delay = policy.delay_for(attempt).as_secs_f64();
                assert!(delay >= 0.0);
                assert!(delay <= upper, "factor {factor} attempt {attempt}: {delay} > {upper}");
            }
        }
    }

    #[test]
    fn linear_strategy_scales_with_attempt() {
        let policy = RetryPolicy::new(RetryStrategy::Linear)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.base_delay_for(20), Duration::from_secs(1));
    }

    #[test]
    fn jitter_factor_is_clamped() {
        assert_eq!(RetryPolicy::device_io().with_jitter_factor(3.0).jitter_factor, 1.0);
        assert_eq!(RetryPolicy::device_io().with_jitter_factor(-1.0).jitter_factor, 0.0);
        assert_eq!(RetryPolicy::device_io().with_jitter_factor(f64::NAN).jitter_factor, 0.0);
    }
}
