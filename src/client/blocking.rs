// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous facade over [`ApiClient`].

use std::sync::Arc;

use http::Method;
use serde_json::Value;
use tokio::runtime::Runtime;

use super::{ApiClient, ClientConfig, LineStream};
use crate::auth::Authenticator;
use crate::config::{ConfigStore, Settings};
use crate::error::{OdahuError, Result};
use crate::resources::{BlockingResourceClient, ResourceKind};

/// Blocking ODAHU API client.
///
/// Drives an [`ApiClient`] on a private current-thread Tokio runtime.
/// Must not be used from within an async context.
#[derive(Debug)]
pub struct BlockingApiClient {
    runtime: Arc<Runtime>,
    inner: ApiClient,
}

#[allow(clippy::result_large_err)]
fn build_runtime() -> Result<Arc<Runtime>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(|e| OdahuError::Config(format!("Failed to start runtime: {e}")))
}

impl BlockingApiClient {
    #[allow(clippy::result_large_err)]
    pub fn new(config: ClientConfig, auth: Authenticator) -> Result<Self> {
        Self::from_async(ApiClient::new(config, auth)?)
    }

    #[allow(clippy::result_large_err)]
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::from_async(ApiClient::from_settings(settings)?)
    }

    #[allow(clippy::result_large_err)]
    pub fn from_store(store: ConfigStore) -> Result<Self> {
        Self::from_async(ApiClient::from_store(store)?)
    }

    /// Wrap an existing async client.
    #[allow(clippy::result_large_err)]
    pub fn from_async(inner: ApiClient) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            inner,
        })
    }

    /// A new blocking client with the same configuration, sharing the credentials.
    pub fn construct_from_other(other: &BlockingApiClient) -> Self {
        Self {
            runtime: other.runtime.clone(),
            inner: ApiClient::construct_from_other(&other.inner),
        }
    }

    pub fn inner(&self) -> &ApiClient {
        &self.inner
    }

    pub fn into_inner(self) -> ApiClient {
        self.inner
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn token(&self) -> Option<String> {
        self.inner.token()
    }

    /// Sub-client for one resource kind.
    pub fn resource(&self, kind: ResourceKind) -> BlockingResourceClient {
        BlockingResourceClient::new(self.runtime.clone(), self.inner.resource(kind))
    }

    /// See [`ApiClient::query`].
    #[allow(clippy::result_large_err)]
    pub fn query(
        &mut self,
        url_template: &str,
        payload: Option<&Value>,
        method: Method,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.inner.query(url_template, payload, method))
    }

    /// See [`ApiClient::stream`]. Lines are read as the iterator advances.
    #[allow(clippy::result_large_err)]
    pub fn stream(
        &mut self,
        url_template: &str,
        method: Method,
        params: Option<&Value>,
    ) -> Result<BlockingLines> {
        let stream = self
            .runtime
            .block_on(self.inner.stream(url_template, method, params))?;
        Ok(BlockingLines::new(self.runtime.clone(), stream))
    }

    #[allow(clippy::result_large_err)]
    pub fn info(&mut self) -> Result<Value> {
        self.runtime.block_on(self.inner.info())
    }
}

/// Iterator over the lines of a streamed response.
#[derive(Debug)]
pub struct BlockingLines {
    runtime: Arc<Runtime>,
    inner: LineStream,
}

impl BlockingLines {
    pub(crate) fn new(runtime: Arc<Runtime>, inner: LineStream) -> Self {
        Self { runtime, inner }
    }
}

impl Iterator for BlockingLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.inner.next_line())
    }
}
