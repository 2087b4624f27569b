// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-kind sub-clients following the REST verb-per-operation convention.

use std::sync::Arc;

use http::Method;
use serde_json::{json, Value};
use tokio::runtime::Runtime;

use super::{ResourceKind, ResourceRecord};
use crate::client::{ApiClient, BlockingLines, LineStream};
use crate::error::{OdahuError, Result};

/// Async client for one resource collection.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    kind: ResourceKind,
    api: ApiClient,
}

impl ResourceClient {
    pub fn new(kind: ResourceKind, api: ApiClient) -> Self {
        Self { kind, api }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{}", self.kind.url_template(), id)
    }

    /// `GET /{resource}/{id}`
    pub async fn get(&mut self, id: &str) -> Result<ResourceRecord> {
        let url = self.item_url(id);
        let body = self.api.query(&url, None, Method::GET).await?;
        ResourceRecord::from_remote(self.kind, body)
    }

    /// `GET /{resource}`
    pub async fn get_all(&mut self) -> Result<Vec<ResourceRecord>> {
        let body = self
            .api
            .query(self.kind.url_template(), None, Method::GET)
            .await?;

        match body {
            Value::Array(items) => items
                .into_iter()
                .map(|item| ResourceRecord::from_remote(self.kind, item))
                .collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(OdahuError::Validation(format!(
                "Expected a list of {} from server, got {other}",
                self.kind
            ))),
        }
    }

    /// `POST /{resource}`
    pub async fn create(&mut self, record: &ResourceRecord) -> Result<ResourceRecord> {
        self.check_kind(record)?;
        let body = self
            .api
            .query(self.kind.url_template(), Some(&record.to_body()), Method::POST)
            .await?;
        ResourceRecord::from_remote(self.kind, body)
    }

    /// `PUT /{resource}`
    pub async fn edit(&mut self, record: &ResourceRecord) -> Result<ResourceRecord> {
        self.check_kind(record)?;
        let body = self
            .api
            .query(self.kind.url_template(), Some(&record.to_body()), Method::PUT)
            .await?;
        ResourceRecord::from_remote(self.kind, body)
    }

    /// `DELETE /{resource}/{id}`, returning the server's message.
    pub async fn delete(&mut self, id: &str) -> Result<String> {
        let url = self.item_url(id);
        let body = self.api.query(&url, None, Method::DELETE).await?;
        Ok(body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// `GET /{resource}/{id}/log?follow=<bool>` as a line stream.
    pub async fn log(&mut self, id: &str, follow: bool) -> Result<LineStream> {
        if !self.kind.supports_logs() {
            return Err(OdahuError::InvalidResourceType(format!(
                "{} (logs are not available)",
                self.kind
            )));
        }
        let url = format!("{}/log", self.item_url(id));
        let params = json!({ "follow": follow });
        self.api.stream(&url, Method::GET, Some(&params)).await
    }

    #[allow(clippy::result_large_err)]
    fn check_kind(&self, record: &ResourceRecord) -> Result<()> {
        if record.kind != self.kind {
            return Err(OdahuError::InvalidResourceType(format!(
                "{} for {} client",
                record.kind, self.kind
            )));
        }
        Ok(())
    }
}

/// Blocking counterpart of [`ResourceClient`].
#[derive(Debug)]
pub struct BlockingResourceClient {
    runtime: Arc<Runtime>,
    inner: ResourceClient,
}

impl BlockingResourceClient {
    pub(crate) fn new(runtime: Arc<Runtime>, inner: ResourceClient) -> Self {
        Self { runtime, inner }
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    #[allow(clippy::result_large_err)]
    pub fn get(&mut self, id: &str) -> Result<ResourceRecord> {
        self.runtime.block_on(self.inner.get(id))
    }

    #[allow(clippy::result_large_err)]
    pub fn get_all(&mut self) -> Result<Vec<ResourceRecord>> {
        self.runtime.block_on(self.inner.get_all())
    }

    #[allow(clippy::result_large_err)]
    pub fn create(&mut self, record: &ResourceRecord) -> Result<ResourceRecord> {
        self.runtime.block_on(self.inner.create(record))
    }

    #[allow(clippy::result_large_err)]
    pub fn edit(&mut self, record: &ResourceRecord) -> Result<ResourceRecord> {
        self.runtime.block_on(self.inner.edit(record))
    }

    #[allow(clippy::result_large_err)]
    pub fn delete(&mut self, id: &str) -> Result<String> {
        self.runtime.block_on(self.inner.delete(id))
    }

    #[allow(clippy::result_large_err)]
    pub fn log(&mut self, id: &str, follow: bool) -> Result<BlockingLines> {
        let stream = self.runtime.block_on(self.inner.log(id, follow))?;
        Ok(BlockingLines::new(self.runtime.clone(), stream))
    }
}
