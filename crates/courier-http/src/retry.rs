//! Bounded retries for idempotent requests.
//!
//! The loop is per request and holds no state between requests. A failed
//! attempt `n` (1-based) is retried when `n <= max_retries`, the failure is a
//! network fault or a 5xx, and the method passes the idempotency predicate.
//! That bounds a request to `max_retries + 1` attempts and the observer sees
//! indices `1..=max_retries`.

use bytes::Bytes;
use rand::Rng;
use reqwest::Method;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::transport::{TransportError, TransportResponse};

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Observer invoked once per retry with the failed attempt index and its cause.
pub type RetryObserver = Arc<dyn Fn(u32, &AttemptFailure) + Send + Sync>;

/// Maps a retry index (1-based) to the wait before the next attempt.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Decides whether a method may be retried.
pub type MethodPredicate = Arc<dyn Fn(&Method) -> bool + Send + Sync>;

/// Terminal outcome of the retry loop.
pub type Outcome = Result<TransportResponse, Arc<TransportError>>;

/// GET, HEAD, OPTIONS, PUT and DELETE. POST and PATCH are never retried by default.
pub fn is_idempotent_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
    )
}

/// Why an attempt failed.
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    /// A response arrived with a non-2xx status.
    Status { status: u16, body: Bytes },
    /// No response arrived.
    Transport(Arc<TransportError>),
}

impl AttemptFailure {
    /// Status code, when a response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptFailure::Status { status, .. } => Some(*status),
            AttemptFailure::Transport(_) => None,
        }
    }

    /// Network fault or server error.
    pub fn is_transient(&self) -> bool {
        match self {
            AttemptFailure::Status { status, .. } => *status >= 500,
            AttemptFailure::Transport(e) => e.is_network(),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Status { status, .. } => {
                write!(f, "request failed with status code {status}")
            }
            AttemptFailure::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// One try of a request.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based attempt index.
    pub number: u32,
    /// Failure of the previous attempt, if this is a retry.
    pub previous: Option<AttemptFailure>,
}

/// Exponential backoff: `min(initial * multiplier^(n-1), max)` plus optional
/// jitter. The jittered delay never exceeds `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Delay before the first retry (default: 100ms)
    pub initial: Duration,
    /// Upper bound (default: 10s)
    pub max: Duration,
    /// Growth factor (default: 2.0)
    pub multiplier: f64,
    /// Add 0-25% random delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Delay before retry `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };
        let nanos = self.initial.as_nanos() as f64 * multiplier.powi(exponent);
        let base = if nanos.is_finite() && nanos < self.max.as_nanos() as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            self.max
        };

        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.0..=0.25);
            base.saturating_add(base.mul_f64(factor)).min(self.max)
        } else {
            base
        }
    }
}

/// How long to wait before each retry.
#[derive(Clone)]
pub enum RetryDelay {
    /// Retry immediately.
    None,
    Fixed(Duration),
    Exponential(ExponentialBackoff),
    Custom(DelayFn),
}

impl RetryDelay {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        RetryDelay::Custom(Arc::new(f))
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryDelay::None => Duration::ZERO,
            RetryDelay::Fixed(d) => *d,
            RetryDelay::Exponential(backoff) => backoff.delay(attempt),
            RetryDelay::Custom(f) => f(attempt),
        }
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        RetryDelay::Exponential(ExponentialBackoff::default())
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDelay::None => f.write_str("None"),
            RetryDelay::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            RetryDelay::Exponential(b) => f.debug_tuple("Exponential").field(b).finish(),
            RetryDelay::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Retry configuration plus the loop that applies it.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: RetryDelay,
    retryable_method: MethodPredicate,
    on_retry: Option<RetryObserver>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: RetryDelay::default(),
            retryable_method: Arc::new(is_idempotent_method),
            on_retry: None,
        }
    }

    /// Exactly one attempt per request.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn with_delay(mut self, delay: RetryDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the idempotency predicate.
    pub fn with_method_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Method) -> bool + Send + Sync + 'static,
    {
        self.retryable_method = Arc::new(predicate);
        self
    }

    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &AttemptFailure) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn with_observer(mut self, observer: Option<RetryObserver>) -> Self {
        self.on_retry = observer;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> &RetryDelay {
        &self.delay
    }

    /// Whether the failed attempt `attempt` (1-based) earns another try.
    pub fn should_retry(&self, failure: &AttemptFailure, method: &Method, attempt: u32) -> bool {
        attempt <= self.max_retries && failure.is_transient() && (self.retryable_method)(method)
    }

    /// Run `send` until it succeeds or the policy gives up, returning the last outcome.
    ///
    /// Attempts are strictly sequential. The only suspension points are
    /// `send` itself and the inter-retry delay.
    pub async fn run<F, Fut>(&self, method: &Method, mut send: F) -> Outcome
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<TransportResponse, TransportError>>,
    {
        let mut number = 1;
        let mut previous = None;

        loop {
            let outcome = send(Attempt { number, previous: previous.take() })
                .await
                .map_err(Arc::new);

            let failure = match failure_of(&outcome) {
                Some(failure) => failure,
                None => return outcome,
            };

            if !self.should_retry(&failure, method, number) {
                return outcome;
            }

            let delay = self.delay.delay(number);
            tracing::warn!(
                %method,
                attempt = number,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                cause = %failure,
                "retrying request"
            );

            if let Some(observer) = &self.on_retry {
                observer(number, &failure);
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            previous = Some(failure);
            number += 1;
        }
    }
}

fn failure_of(outcome: &Outcome) -> Option<AttemptFailure> {
    match outcome {
        Ok(response) if response.is_success() => None,
        Ok(response) => Some(AttemptFailure::Status {
            status: response.status,
            body: response.body.clone(),
        }),
        Err(e) => Some(AttemptFailure::Transport(Arc::clone(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn status(code: u16) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse::new(code))
    }

    fn refused() -> Result<TransportResponse, TransportError> {
        Err(TransportError::Network("connection refused".into()))
    }

    /// Runs the policy over a scripted sequence, returning the outcome and
    /// the observer indices.
    async fn run_script(
        policy: RetryPolicy,
        method: Method,
        script: Vec<Result<TransportResponse, TransportError>>,
    ) -> (Outcome, Vec<u32>, u32) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let policy = policy.with_delay(RetryDelay::None).on_retry({
            let seen = Arc::clone(&seen);
            move |attempt, _| seen.lock().push(attempt)
        });
        let script = Mutex::new(VecDeque::from(script));
        let calls = Mutex::new(0u32);

        let outcome = policy
            .run(&method, |attempt| {
                *calls.lock() += 1;
                assert_eq!(attempt.number, *calls.lock());
                let next = script.lock().pop_front().expect("script exhausted");
                async move { next }
            })
            .await;

        let observed = seen.lock().clone();
        let calls = *calls.lock();
        (outcome, observed, calls)
    }

    #[test]
    fn test_idempotent_methods() {
        for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::PUT, Method::DELETE] {
            assert!(is_idempotent_method(&method), "{method}");
        }
        assert!(!is_idempotent_method(&Method::POST));
        assert!(!is_idempotent_method(&Method::PATCH));
    }

    #[test]
    fn test_should_retry_bounds() {
        let policy = RetryPolicy::new(3);
        let failure = AttemptFailure::Status { status: 503, body: Bytes::new() };

        assert!(policy.should_retry(&failure, &Method::GET, 1));
        assert!(policy.should_retry(&failure, &Method::GET, 3));
        assert!(!policy.should_retry(&failure, &Method::GET, 4));
        assert!(!policy.should_retry(&failure, &Method::POST, 1));
    }

    #[test]
    fn test_should_retry_only_transient() {
        let policy = RetryPolicy::new(3);
        let client_error = AttemptFailure::Status {
            status: 404,
            body: Bytes::new(),
        };
        let invalid =
            AttemptFailure::Transport(Arc::new(TransportError::InvalidRequest("x".into())));
        let timeout =
            AttemptFailure::Transport(Arc::new(TransportError::Timeout(Duration::from_secs(1))));

        assert!(!policy.should_retry(&client_error, &Method::GET, 1));
        assert!(!policy.should_retry(&invalid, &Method::GET, 1));
        assert!(policy.should_retry(&timeout, &Method::GET, 1));
    }

    #[tokio::test]
    async fn test_retries_until_exhausted() {
        let (outcome, observed, calls) = run_script(
            RetryPolicy::new(3),
            Method::GET,
            vec![status(502), status(502), status(502), status(502)],
        )
        .await;

        assert_eq!(outcome.unwrap().status, 502);
        assert_eq!(observed, vec![1, 2, 3]);
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let (outcome, observed, calls) = run_script(
            RetryPolicy::new(3),
            Method::DELETE,
            vec![refused(), status(500), status(200)],
        )
        .await;

        assert_eq!(outcome.unwrap().status, 200);
        assert_eq!(observed, vec![1, 2]);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_post_is_not_retried() {
        let (outcome, observed, calls) =
            run_script(RetryPolicy::new(3), Method::POST, vec![status(503)]).await;

        assert_eq!(outcome.unwrap().status, 503);
        assert!(observed.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_patch_network_fault_is_not_retried() {
        let (outcome, observed, calls) =
            run_script(RetryPolicy::new(3), Method::PATCH, vec![refused()]).await;

        assert!(outcome.unwrap_err().is_network());
        assert!(observed.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (outcome, _, calls) =
            run_script(RetryPolicy::new(3), Method::GET, vec![status(404)]).await;

        assert_eq!(outcome.unwrap().status, 404);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_disabled_makes_one_attempt() {
        let (_, observed, calls) =
            run_script(RetryPolicy::disabled(), Method::GET, vec![status(500)]).await;

        assert!(observed.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_custom_method_predicate() {
        let policy = RetryPolicy::new(1).with_method_predicate(|m| *m == Method::POST);
        let (outcome, observed, calls) =
            run_script(policy, Method::POST, vec![status(500), status(201)]).await;

        assert_eq!(outcome.unwrap().status, 201);
        assert_eq!(observed, vec![1]);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_previous_failure_is_carried() {
        let policy = RetryPolicy::new(1).with_delay(RetryDelay::None);
        let seen = Mutex::new(Vec::new());
        let mut script = VecDeque::from(vec![status(503), status(200)]);

        policy
            .run(&Method::GET, |attempt| {
                seen.lock().push(attempt.previous.as_ref().and_then(AttemptFailure::status));
                let next = script.pop_front().unwrap();
                async move { next }
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec![None, Some(503)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applied_between_attempts() {
        let policy = RetryPolicy::new(2)
            .with_delay(RetryDelay::custom(|n| Duration::from_secs(u64::from(n))));
        let start = tokio::time::Instant::now();
        let mut script = VecDeque::from(vec![status(500), status(500), status(500)]);

        let outcome = policy
            .run(&Method::GET, |_| {
                let next = script.pop_front().unwrap();
                async move { next }
            })
            .await;

        assert_eq!(outcome.unwrap().status, 500);
        // 1s after the first failure, 2s after the second
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[test]
    fn test_exponential_backoff_without_jitter() {
        let backoff = ExponentialBackoff {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(30), Duration::from_secs(10));
    }

    #[test]
    fn test_exponential_backoff_jitter_bounds() {
        let backoff = ExponentialBackoff::default();
        for _ in 0..50 {
            let d = backoff.delay(2);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(251));
        }
    }

    #[test]
    fn test_jitter_stays_under_max() {
        let capped = ExponentialBackoff::default();
        for _ in 0..50 {
            assert!(capped.delay(30) <= Duration::from_secs(10));
        }

        let huge = ExponentialBackoff {
            initial: Duration::MAX,
            max: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(huge.delay(3), Duration::MAX);
    }

    #[test]
    fn test_delay_variants() {
        assert_eq!(RetryDelay::None.delay(3), Duration::ZERO);
        assert_eq!(RetryDelay::Fixed(Duration::from_millis(5)).delay(9), Duration::from_millis(5));
        assert_eq!(
            RetryDelay::custom(|n| Duration::from_millis(u64::from(n) * 10)).delay(4),
            Duration::from_millis(40)
        );
    }
}
