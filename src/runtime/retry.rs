// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transparent re-issuing of transient failures.
//!
//! A request that hits `429`, `500`, `502`, `503` or `504`, or that cannot
//! connect at all, is sent again after an exponential delay until the retry
//! budget is spent. Callers of the client never see the intermediate
//! attempts.
//!
//! # Example
//!
//! ```
//! use odahu_api_rs::runtime::RetryConfig;
//! use std::time::Duration;
//!
//! // Three retries waiting 0.5 s, 1 s and 2 s.
//! let retry = RetryConfig::from_budget(3, 0.5);
//! assert_eq!(retry.backoff.delay(2), Duration::from_secs(2));
//! ```

use std::time::Duration;

use http::{Method, StatusCode};
use tracing::debug;

/// Statuses that are retried for idempotent requests.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Upper bound for a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// `factor * 2^attempt` seconds, capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
}

impl ExponentialBackoff {
    /// Delay of `backoff_factor * 2^attempt` seconds, capped at [`MAX_BACKOFF`].
    ///
    /// Negative or non-finite factors mean no delay; factors above the cap
    /// are clamped to it.
    pub fn from_factor(backoff_factor: f64) -> Self {
        let base = if backoff_factor.is_finite() && backoff_factor > 0.0 {
            Duration::try_from_secs_f64(backoff_factor)
                .unwrap_or(MAX_BACKOFF)
                .min(MAX_BACKOFF)
        } else {
            Duration::ZERO
        };
        Self {
            base,
            cap: MAX_BACKOFF,
        }
    }

    #[must_use]
    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// Delay before the n-th retry (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(63) as i32);
        let seconds = (self.base.as_secs_f64() * factor).min(self.cap.as_secs_f64());
        Duration::try_from_secs_f64(seconds).unwrap_or(self.cap)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_factor(1.0)
    }
}

/// What happened on a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The server answered with this status.
    Status(StatusCode),
    /// The connection could not be established.
    ConnectFailure,
    TimedOut,
    /// Any other transport failure (body, decode, redirect loop).
    OtherFailure,
}

/// Extracts an [`AttemptOutcome`] from the result of one attempt.
pub trait ClassifyAttempt {
    fn outcome(&self) -> AttemptOutcome;
}

impl ClassifyAttempt for std::result::Result<reqwest::Response, reqwest::Error> {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            Ok(response) => AttemptOutcome::Status(response.status()),
            Err(e) if e.is_connect() => AttemptOutcome::ConnectFailure,
            Err(e) if e.is_timeout() => AttemptOutcome::TimedOut,
            Err(_) => AttemptOutcome::OtherFailure,
        }
    }
}

/// Whether an attempt is sent again.
///
/// Connection failures are retried for every verb, since nothing reached
/// the server. Transient statuses and timeouts only for idempotent verbs,
/// so a `POST` the server has seen is never sent twice.
pub fn should_retry(method: &Method, outcome: AttemptOutcome) -> bool {
    match outcome {
        AttemptOutcome::ConnectFailure => true,
        AttemptOutcome::TimedOut => is_idempotent(method),
        AttemptOutcome::Status(status) => {
            is_idempotent(method) && RETRY_STATUSES.contains(&status.as_u16())
        }
        AttemptOutcome::OtherFailure => false,
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// Retry budget and backoff of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: ExponentialBackoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_budget(3, 1.0)
    }
}

impl RetryConfig {
    /// `retries` retries with `backoff_factor * 2^n` second delays.
    pub fn from_budget(retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries: retries,
            backoff: ExponentialBackoff::from_factor(backoff_factor),
        }
    }

    /// Run `operation` until [`should_retry`] rejects its outcome or the
    /// budget is spent, and return the last attempt either way.
    pub async fn execute<T, F, Fut>(&self, method: &Method, mut operation: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = T>,
        T: ClassifyAttempt,
    {
        let mut attempt = 0;

        loop {
            let result = operation().await;
            let outcome = result.outcome();

            if attempt >= self.max_retries || !should_retry(method, outcome) {
                return result;
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                target: "odahu_api::http",
                "Retrying {} in {:?} ({}/{}) after {:?}",
                method,
                delay,
                attempt + 1,
                self.max_retries,
                outcome
            );
            drop(result);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Attempt result that needs no network.
    #[derive(Debug, PartialEq)]
    enum Fake {
        Status(u16),
        Refused,
    }

    impl ClassifyAttempt for Fake {
        fn outcome(&self) -> AttemptOutcome {
            match self {
                Fake::Status(code) => {
                    AttemptOutcome::Status(StatusCode::from_u16(*code).unwrap())
                }
                Fake::Refused => AttemptOutcome::ConnectFailure,
            }
        }
    }

    fn immediate(retries: u32) -> RetryConfig {
        RetryConfig::from_budget(retries, 0.0)
    }

    async fn count_calls<T: ClassifyAttempt>(
        retry: &RetryConfig,
        method: Method,
        script: impl Fn(u32) -> T,
    ) -> (T, u32) {
        let calls = AtomicU32::new(0);
        let result = retry
            .execute(&method, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(script(n))
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn test_factor_backoff_doubles_and_caps() {
        let backoff = ExponentialBackoff::from_factor(1.0);
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(20), MAX_BACKOFF);
        assert_eq!(backoff.delay(u32::MAX), MAX_BACKOFF);

        let custom = ExponentialBackoff::from_factor(0.125).with_cap(Duration::from_millis(500));
        assert_eq!(custom.delay(1), Duration::from_millis(250));
        assert_eq!(custom.delay(2), Duration::from_millis(500));
        assert_eq!(custom.delay(3), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_and_invalid_factor_means_no_delay() {
        assert_eq!(ExponentialBackoff::from_factor(0.0).delay(5), Duration::ZERO);
        assert_eq!(ExponentialBackoff::from_factor(-1.0).delay(0), Duration::ZERO);
        assert_eq!(ExponentialBackoff::from_factor(f64::NAN).delay(0), Duration::ZERO);
    }

    #[test]
    fn test_huge_factor_is_clamped() {
        let backoff = ExponentialBackoff::from_factor(1e20);
        assert_eq!(backoff.delay(0), MAX_BACKOFF);
        assert_eq!(backoff.delay(40), MAX_BACKOFF);
        assert_eq!(ExponentialBackoff::from_factor(f64::MAX).delay(1), MAX_BACKOFF);

        let uncapped = ExponentialBackoff::from_factor(1e20).with_cap(Duration::MAX);
        assert_eq!(uncapped.delay(63), Duration::MAX);
    }

    #[test]
    fn test_retry_decision() {
        for code in RETRY_STATUSES {
            let outcome = AttemptOutcome::Status(StatusCode::from_u16(code).unwrap());
            assert!(should_retry(&Method::GET, outcome));
            assert!(should_retry(&Method::DELETE, outcome));
            assert!(!should_retry(&Method::POST, outcome));
        }
        for code in [200, 201, 400, 401, 404, 409, 501] {
            let outcome = AttemptOutcome::Status(StatusCode::from_u16(code).unwrap());
            assert!(!should_retry(&Method::GET, outcome));
        }
        assert!(should_retry(&Method::POST, AttemptOutcome::ConnectFailure));
        assert!(!should_retry(&Method::POST, AttemptOutcome::TimedOut));
        assert!(should_retry(&Method::GET, AttemptOutcome::TimedOut));
        assert!(!should_retry(&Method::GET, AttemptOutcome::OtherFailure));
    }

    #[test]
    fn test_budget() {
        let retry = RetryConfig::from_budget(5, 0.5);
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.backoff.delay(0), Duration::from_millis(500));
        assert_eq!(RetryConfig::default(), RetryConfig::from_budget(3, 1.0));
    }

    #[tokio::test]
    async fn test_transient_status_then_success() {
        let (result, calls) = count_calls(&immediate(3), Method::GET, |n| {
            if n < 2 {
                Fake::Status(503)
            } else {
                Fake::Status(200)
            }
        })
        .await;
        assert_eq!(result, Fake::Status(200));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_last_attempt() {
        let (result, calls) = count_calls(&immediate(2), Method::GET, |_| Fake::Refused).await;
        assert_eq!(result, Fake::Refused);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_permanent_status_not_retried() {
        let (result, calls) = count_calls(&immediate(3), Method::GET, |_| Fake::Status(400)).await;
        assert_eq!(result, Fake::Status(400));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_post_status_not_retried() {
        let (result, calls) = count_calls(&immediate(3), Method::POST, |_| Fake::Status(503)).await;
        assert_eq!(result, Fake::Status(503));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_zero_budget_sends_once() {
        let (_, calls) = count_calls(&immediate(0), Method::GET, |_| Fake::Status(503)).await;
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_classify_reqwest_response() {
        let response: reqwest::Response = http::Response::builder()
            .status(502)
            .body("bad gateway")
            .unwrap()
            .into();
        let result: std::result::Result<reqwest::Response, reqwest::Error> = Ok(response);

        assert_eq!(
            result.outcome(),
            AttemptOutcome::Status(StatusCode::BAD_GATEWAY)
        );
    }
}
