// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request building: URL templates, payload placement and bearer headers.
//!
//! Building is pure. Nothing here touches the network.

use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use serde_json::Value;

use crate::error::{OdahuError, Result};

/// API version substituted for `{version}` in URL templates.
pub const API_VERSION: &str = "v1";

const EVENT_STREAM: &str = "text/event-stream";

/// Where the payload of a request goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    /// Query parameters (used for `GET`).
    Query(Vec<(String, String)>),
    /// JSON body (every other verb).
    Json(Value),
}

/// A transport-ready request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub payload: Payload,
}

/// Turns URL templates into [`RequestDescriptor`]s against one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    base_url: String,
}

impl UrlBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a template such as `/api/{version}/connection/{id}` to a full URL.
    pub fn url(&self, url_template: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            url_template.replace("{version}", API_VERSION)
        )
    }

    /// Build a request descriptor.
    ///
    /// `GET` places an object payload in the query string; other verbs send
    /// the payload as a JSON body. `token` adds `Authorization: Bearer`.
    #[allow(clippy::result_large_err)]
    pub fn build(
        &self,
        url_template: &str,
        method: Method,
        payload: Option<&Value>,
        token: Option<&str>,
        stream: bool,
    ) -> Result<RequestDescriptor> {
        let mut headers = HeaderMap::new();

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| OdahuError::Validation(format!("Invalid token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        if stream {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        }

        let payload = match payload {
            None | Some(Value::Null) => Payload::None,
            Some(value) if method == Method::GET => Payload::Query(query_pairs(value)?),
            Some(value) => Payload::Json(value.clone()),
        };

        Ok(RequestDescriptor {
            method,
            url: self.url(url_template),
            headers,
            payload,
        })
    }
}

/// Flatten a JSON object into query parameters.
///
/// Arrays repeat the key once per element; nulls are dropped.
#[allow(clippy::result_large_err)]
fn query_pairs(value: &Value) -> Result<Vec<(String, String)>> {
    let object = value.as_object().ok_or_else(|| {
        OdahuError::Validation(format!("Query parameters must be an object, got {value}"))
    })?;

    let mut pairs = Vec::new();
    for (key, value) in object {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(rendered) = scalar(item) {
                        pairs.push((key.clone(), rendered));
                    }
                }
            }
            other => {
                if let Some(rendered) = scalar(other) {
                    pairs.push((key.clone(), rendered));
                }
            }
        }
    }
    Ok(pairs)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
