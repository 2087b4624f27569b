// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request log lines and counters on the `odahu_api::http` target.
//!
//! # Example
//!
//! ```
//! use odahu_api_rs::runtime::{LoggingConfig, RequestLogger};
//! use tracing::Level;
//!
//! let logger = RequestLogger::with_config(LoggingConfig::new().with_success_level(Some(Level::INFO)));
//! let span = logger.start("GET", "http://localhost:5000/api/v1/connection");
//! logger.finish_status(span, 200);
//! assert_eq!(logger.metrics().succeeded(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use http::HeaderMap;
use tracing::Level;

const TARGET: &str = "odahu_api::http";

/// Headers whose values never reach the log.
const ALWAYS_REDACTED: [&str; 3] = ["authorization", "cookie", "set-cookie"];

fn emit(level: Option<Level>, message: &str) {
    match level {
        None => {}
        Some(Level::ERROR) => tracing::error!(target: TARGET, "{}", message),
        Some(Level::WARN) => tracing::warn!(target: TARGET, "{}", message),
        Some(Level::INFO) => tracing::info!(target: TARGET, "{}", message),
        Some(Level::DEBUG) => tracing::debug!(target: TARGET, "{}", message),
        Some(_) => tracing::trace!(target: TARGET, "{}", message),
    }
}

/// What a [`RequestLogger`] writes. `None` levels silence that kind of line.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub success_level: Option<Level>,
    /// Level for `[400, 600)` responses and transport failures.
    pub error_level: Option<Level>,
    pub log_headers: bool,
    /// Full URL when true, path only otherwise.
    pub log_url: bool,
    /// Extra header names to redact, on top of credentials and cookies.
    pub redacted_headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            success_level: Some(Level::DEBUG),
            error_level: Some(Level::WARN),
            log_headers: false,
            log_url: true,
            redacted_headers: Vec::new(),
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_success_level(mut self, level: Option<Level>) -> Self {
        self.success_level = level;
        self
    }

    #[must_use]
    pub fn with_error_level(mut self, level: Option<Level>) -> Self {
        self.error_level = level;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, enabled: bool) -> Self {
        self.log_headers = enabled;
        self
    }

    #[must_use]
    pub fn with_url(mut self, enabled: bool) -> Self {
        self.log_url = enabled;
        self
    }

    #[must_use]
    pub fn with_redacted_header(mut self, name: impl Into<String>) -> Self {
        self.redacted_headers.push(name.into());
        self
    }

    fn is_redacted(&self, name: &str) -> bool {
        ALWAYS_REDACTED
            .iter()
            .copied()
            .chain(self.redacted_headers.iter().map(String::as_str))
            .any(|h| h.eq_ignore_ascii_case(name))
    }
}

/// Request counters of one logger, shared by clients derived from each other.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, success: bool) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.total().saturating_sub(self.failed())
    }
}

/// Logs each HTTP exchange and counts outcomes.
#[derive(Debug, Default)]
pub struct RequestLogger {
    config: LoggingConfig,
    metrics: RequestMetrics,
}

impl RequestLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoggingConfig) -> Self {
        Self {
            config,
            metrics: RequestMetrics::new(),
        }
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }

    pub fn start(&self, method: &str, url: &str) -> RequestSpan {
        let target = if self.config.log_url {
            url.to_string()
        } else {
            url::Url::parse(url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| url.to_string())
        };
        emit(self.config.success_level, &format!("{method} {target}"));

        RequestSpan {
            method: method.to_string(),
            target,
            started: Instant::now(),
        }
    }

    pub fn log_headers(&self, headers: &HeaderMap) {
        if self.config.log_headers {
            emit(
                self.config.success_level,
                &format!("headers: {}", self.render_headers(headers)),
            );
        }
    }

    /// `name=value` pairs with credentials replaced by `***`.
    pub fn render_headers(&self, headers: &HeaderMap) -> String {
        headers
            .iter()
            .map(|(name, value)| {
                if self.config.is_redacted(name.as_str()) {
                    format!("{name}=***")
                } else {
                    format!("{name}={}", value.to_str().unwrap_or("<binary>"))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Close a span that got a response. `[400, 600)` counts as a failure.
    pub fn finish_status(&self, span: RequestSpan, status: u16) {
        let success = !(400..600).contains(&status);
        self.metrics.record(success);
        let level = if success {
            self.config.success_level
        } else {
            self.config.error_level
        };
        emit(
            level,
            &format!(
                "{} {} -> {} ({:?})",
                span.method,
                span.target,
                status,
                span.elapsed()
            ),
        );
    }

    /// Close a span that never got a response.
    pub fn finish_error(&self, span: RequestSpan, error: &str) {
        self.metrics.record(false);
        emit(
            self.config.error_level,
            &format!(
                "{} {} failed after {:?}: {}",
                span.method,
                span.target,
                span.elapsed(),
                error
            ),
        );
    }
}

/// A request between [`RequestLogger::start`] and its finish call.
#[derive(Debug)]
pub struct RequestSpan {
    method: String,
    target: String,
    started: Instant,
}

impl RequestSpan {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// URL or path, depending on [`LoggingConfig::log_url`].
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::AUTHORIZATION;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_builders() {
        let default = LoggingConfig::new();
        assert_eq!(default.success_level, Some(Level::DEBUG));
        assert_eq!(default.error_level, Some(Level::WARN));

        let config = LoggingConfig::new()
            .with_success_level(None)
            .with_error_level(Some(Level::ERROR))
            .with_headers(true)
            .with_url(false);
        assert_eq!(config.success_level, None);
        assert_eq!(config.error_level, Some(Level::ERROR));
        assert!(config.log_headers);
        assert!(!config.log_url);
    }

    #[test]
    fn test_credentials_always_redacted() {
        let logger = RequestLogger::with_config(LoggingConfig::new().with_headers(true));
        let mut map = headers(&[("content-type", "application/json")]);
        map.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret-token"));

        let rendered = logger.render_headers(&map);
        assert!(rendered.contains("authorization=***"));
        assert!(rendered.contains("content-type=application/json"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn test_extra_redacted_header() {
        let logger =
            RequestLogger::with_config(LoggingConfig::new().with_redacted_header("X-Api-Key"));
        let rendered = logger.render_headers(&headers(&[("x-api-key", "k"), ("accept", "*/*")]));
        assert!(rendered.contains("x-api-key=***"));
        assert!(rendered.contains("accept=*/*"));
        assert!(logger.render_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_metrics() {
        let metrics = RequestMetrics::new();
        assert_eq!(metrics.total(), 0);

        metrics.record(true);
        metrics.record(true);
        metrics.record(false);
        assert_eq!(metrics.total(), 3);
        assert_eq!(metrics.succeeded(), 2);
        assert_eq!(metrics.failed(), 1);
    }

    #[test]
    fn test_status_classification() {
        let logger = RequestLogger::new();

        let span = logger.start("GET", "http://localhost/api/v1/connection/a");
        assert_eq!(span.method(), "GET");
        logger.finish_status(span, 200);
        logger.finish_status(logger.start("GET", "http://localhost/x"), 302);
        logger.finish_status(logger.start("GET", "http://localhost/y"), 404);

        assert_eq!(logger.metrics().succeeded(), 2);
        assert_eq!(logger.metrics().failed(), 1);
    }

    #[test]
    fn test_path_only_target() {
        let logger = RequestLogger::with_config(LoggingConfig::new().with_url(false));
        let span = logger.start("DELETE", "http://localhost:5000/api/v1/model/route/r1");
        assert_eq!(span.target(), "/api/v1/model/route/r1");

        logger.finish_error(span, "connection refused");
        assert_eq!(logger.metrics().failed(), 1);
    }
}
