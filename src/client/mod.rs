// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport for the ODAHU API.
//!
//! [`ApiClient`] executes requests with transparent retries, re-authenticates
//! once when the server asks for a login, and exposes both single-response
//! ([`ApiClient::query`]) and streamed-line ([`ApiClient::stream`]) calls.
//! [`BlockingApiClient`] offers the same contract to synchronous callers.

mod blocking;
mod request;
mod response;


use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::{login_required, Authenticator};
use crate::config::{ConfigStore, Settings};
use crate::error::{OdahuError, Result};
use crate::resources::{ResourceClient, ResourceKind};
use crate::runtime::{LoggingConfig, RequestLogger, RetryConfig};

pub use blocking::{BlockingApiClient, BlockingLines};
pub use request::{Payload, RequestDescriptor, UrlBuilder, API_VERSION};
pub use response::{handle_query_response, LineDecoder, LineStream};

/// Transport settings, fixed for the lifetime of a client.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Retry budget for transient failures.
    pub retries: u32,
    /// Backoff factor in seconds: the n-th retry waits `factor * 2^n`.
    pub backoff_factor: f64,
    /// Per-request timeout; zero disables it. Streams only apply it to
    /// connecting.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ClientConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            base_url: settings.api_url.clone(),
            retries: settings.retry_attempts,
            backoff_factor: settings.backoff_factor,
            timeout: settings.api_timeout,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Async ODAHU API client.
///
/// Clones, [`ApiClient::construct_from_other`] and [`ApiClient::resource`]
/// share credentials with the client they come from: a login through any of
/// them replaces the token used by all.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    urls: UrlBuilder,
    http: reqwest::Client,
    retry: RetryConfig,
    auth: Authenticator,
    logger: Arc<RequestLogger>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// `Config` if the base URL is not a valid URL or the HTTP client
    /// cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(config: ClientConfig, auth: Authenticator) -> Result<Self> {
        Url::parse(&config.base_url).map_err(|e| {
            OdahuError::Config(format!("Invalid API URL {}: {}", config.base_url, e))
        })?;

        let mut builder = reqwest::Client::builder();
        if !config.timeout.is_zero() {
            builder = builder.connect_timeout(config.timeout);
        }
        let http = builder
            .build()
            .map_err(|e| OdahuError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            urls: UrlBuilder::new(config.base_url.clone()),
            retry: RetryConfig::from_budget(config.retries, config.backoff_factor),
            config,
            http,
            auth,
            logger: Arc::new(RequestLogger::new()),
        })
    }

    /// Client configured from resolved settings, without persistence.
    #[allow(clippy::result_large_err)]
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            ClientConfig::from(settings),
            Authenticator::from_settings(settings),
        )
    }

    /// Client configured from a config store; renewed credentials are
    /// written back to it.
    #[allow(clippy::result_large_err)]
    pub fn from_store(store: ConfigStore) -> Result<Self> {
        let settings = Settings::load(&store)?;
        Self::new(
            ClientConfig::from(&settings),
            Authenticator::from_settings(&settings).with_store(store),
        )
    }

    /// A new client with the same configuration, sharing the credentials.
    pub fn construct_from_other(other: &ApiClient) -> Self {
        Self {
            config: other.config.clone(),
            urls: other.urls.clone(),
            http: other.http.clone(),
            retry: other.retry.clone(),
            auth: other.auth.derive(other.config.base_url.clone()),
            logger: other.logger.clone(),
        }
    }

    /// Replace the request logger.
    #[must_use]
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logger = Arc::new(RequestLogger::with_config(config));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    /// Current bearer token.
    pub fn token(&self) -> Option<String> {
        self.auth.token()
    }

    /// Sub-client for one resource kind.
    pub fn resource(&self, kind: ResourceKind) -> ResourceClient {
        ResourceClient::new(kind, Self::construct_from_other(self))
    }

    /// Perform a request and decode the JSON answer.
    ///
    /// # Errors
    ///
    /// - `Connection` when the server stays unreachable after retries
    /// - `EntityAlreadyExists` on `409`
    /// - `WrongHttpStatusCode` on any other `[400, 600)` status
    /// - `IncorrectAuthorizationToken`/`IncorrectClientCredentials` when
    ///   login fails
    pub async fn query(
        &mut self,
        url_template: &str,
        payload: Option<&Value>,
        method: Method,
    ) -> Result<Value> {
        let (url, response) = self
            .request_with_login(url_template, payload, method, false)
            .await?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| OdahuError::Connection { url, source })?;

        handle_query_response(status, &body)
    }

    /// Perform a request and read the answer as lines of text.
    ///
    /// Fails with `WrongHttpStatusCode` before yielding anything when the
    /// response status is `[400, 600)`.
    pub async fn stream(
        &mut self,
        url_template: &str,
        method: Method,
        params: Option<&Value>,
    ) -> Result<LineStream> {
        let (url, response) = self
            .request_with_login(url_template, params, method, true)
            .await?;
        LineStream::open(url, response).await
    }

    /// Health check: `GET /health`.
    pub async fn info(&mut self) -> Result<Value> {
        self.query("/health", None, Method::GET).await
    }

    /// Send a request, logging in and re-sending once if required.
    ///
    /// The second send runs with `limit_stack` set, so a second login
    /// request fails inside [`Authenticator::renew`] without network I/O.
    async fn request_with_login(
        &mut self,
        url_template: &str,
        payload: Option<&Value>,
        method: Method,
        stream: bool,
    ) -> Result<(String, reqwest::Response)> {
        let mut limit_stack = false;
        loop {
            let sent_token = self.auth.token();
            let descriptor = self.urls.build(
                url_template,
                method.clone(),
                payload,
                sent_token.as_deref(),
                stream,
            )?;
            let (requested, response) = self.send(&descriptor, stream).await?;

            if !login_required(&requested, &response) {
                return Ok((descriptor.url, response));
            }

            let final_url = response.url().to_string();
            debug!(
                target: "odahu_api::http",
                "Login required for {} {} (status {}, final URL {})",
                descriptor.method,
                descriptor.url,
                response.status(),
                final_url
            );
            drop(response);

            self.auth
                .renew(&final_url, sent_token.as_deref(), limit_stack)
                .await?;
            limit_stack = true;
        }
    }

    fn prepare(&self, descriptor: &RequestDescriptor, stream: bool) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(descriptor.method.clone(), descriptor.url.as_str())
            .headers(descriptor.headers.clone());

        if !stream && !self.config.timeout.is_zero() {
            builder = builder.timeout(self.config.timeout);
        }

        match &descriptor.payload {
            Payload::None => builder,
            Payload::Query(pairs) => builder.query(pairs),
            Payload::Json(body) => builder.json(body),
        }
    }

    async fn send(
        &self,
        descriptor: &RequestDescriptor,
        stream: bool,
    ) -> Result<(Url, reqwest::Response)> {
        let requested = self
            .prepare(descriptor, stream)
            .build()
            .map_err(|source| OdahuError::Connection {
                url: descriptor.url.clone(),
                source,
            })?
            .url()
            .clone();

        let span = self.logger.start(descriptor.method.as_str(), requested.as_str());
        self.logger.log_headers(&descriptor.headers);

        let result = self
            .retry
            .execute(&descriptor.method, || self.prepare(descriptor, stream).send())
            .await;

        match result {
            Ok(response) => {
                self.logger.finish_status(span, response.status().as_u16());
                Ok((requested, response))
            }
            Err(source) => {
                self.logger.finish_error(span, &source.to_string());
                Err(OdahuError::Connection {
                    url: self.config.base_url.clone(),
                    source,
                })
            }
        }
    }
}
