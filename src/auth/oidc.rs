// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenID Provider discovery.

use serde_json::Value;
use tracing::debug;

use crate::error::{OdahuError, Result};

pub const WELL_KNOWN_CONFIGURATION_URL: &str = ".well-known/openid-configuration";

/// Provider metadata key for the token endpoint.
pub const TOKEN_ENDPOINT: &str = "token_endpoint";

/// OpenID Provider configuration fetched from an issuer.
#[derive(Debug, Clone)]
pub struct OpenIdProviderConfiguration {
    issuer: String,
    document: Value,
}

impl OpenIdProviderConfiguration {
    /// Discovery document URL for an issuer.
    pub fn configuration_url(issuer: &str) -> String {
        format!(
            "{}/{}",
            issuer.trim_end_matches('/'),
            WELL_KNOWN_CONFIGURATION_URL
        )
    }

    /// Fetch the discovery document.
    ///
    /// # Errors
    ///
    /// `Connection` if the issuer is unreachable, `WrongHttpStatusCode` for
    /// a non-200 answer, `Json` if the document is not JSON.
    pub async fn fetch(http: &reqwest::Client, issuer: &str) -> Result<Self> {
        let url = Self::configuration_url(issuer);
        debug!(target: "odahu_api::auth", "Fetching OpenID Provider configuration from {}", url);

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|source| OdahuError::Connection {
                url: url.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| OdahuError::Connection {
                url: url.clone(),
                source,
            })?;

        if status != 200 {
            let answer =
                serde_json::from_slice(&body).unwrap_or_else(|_| Value::Object(Default::default()));
            return Err(OdahuError::from_status(status, answer));
        }

        Ok(Self {
            issuer: issuer.to_string(),
            document: serde_json::from_slice(&body)?,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// A metadata value by key.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    #[allow(clippy::result_large_err)]
    pub fn token_endpoint(&self) -> Result<String> {
        self.value(TOKEN_ENDPOINT)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                OdahuError::Validation(format!(
                    "OpenID Provider {} does not advertise {}",
                    self.issuer, TOKEN_ENDPOINT
                ))
            })
    }
}

/// Discover the token endpoint of an issuer.
pub async fn fetch_token_endpoint(http: &reqwest::Client, issuer: &str) -> Result<String> {
    OpenIdProviderConfiguration::fetch(http, issuer)
        .await?
        .token_endpoint()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockResponse, MockServer};
    use serde_json::json;

    #[test]
    fn test_configuration_url() {
        assert_eq!(
            OpenIdProviderConfiguration::configuration_url("https://idp/realms/odahu/"),
            "https://idp/realms/odahu/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn test_fetch_token_endpoint() {
        let server = MockServer::start();
        server.on(
            "GET",
            "/.well-known/openid-configuration",
            MockResponse::json(200, json!({"token_endpoint": "https://idp/token"})),
        );

        let endpoint = fetch_token_endpoint(&reqwest::Client::new(), &server.url())
            .await
            .unwrap();
        assert_eq!(endpoint, "https://idp/token");
    }

    #[tokio::test]
    async fn test_fetch_fails_on_error_status() {
        let server = MockServer::start();

        let result = fetch_token_endpoint(&reqwest::Client::new(), &server.url()).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_missing_token_endpoint() {
        let server = MockServer::start();
        server.on(
            "GET",
            "/.well-known/openid-configuration",
            MockResponse::json(200, json!({"issuer": "x"})),
        );

        let result = fetch_token_endpoint(&reqwest::Client::new(), &server.url()).await;
        assert!(matches!(result, Err(OdahuError::Validation(_))));
    }
}
