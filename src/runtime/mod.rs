// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime utilities for resilience and observability.
//!
//! Retries with exponential backoff, and request logging with metrics, used by
//! the API client for every HTTP call.

mod logging;
mod retry;

pub use logging::{LoggingConfig, RequestLogger, RequestMetrics, RequestSpan};
pub use retry::{
    should_retry, AttemptOutcome, ClassifyAttempt, ExponentialBackoff, RetryConfig, MAX_BACKOFF,
    RETRY_STATUSES,
};
