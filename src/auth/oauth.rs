// SPDX-License-Identifier: MIT OR Apache-2.0

//! OAuth2 grants and login results.

use std::fmt;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{OdahuError, Result};

const STATE_LENGTH: usize = 10;
const STATE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Tokens and identity obtained from a successful grant.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthLoginResult {
    pub id_token: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Token endpoint that issued these tokens; used for later refreshes.
    pub issuing_url: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

impl OAuthLoginResult {
    /// Bearer token for API calls: the ID token, else the access token.
    pub fn token(&self) -> &str {
        self.id_token.as_deref().unwrap_or(&self.access_token)
    }
}

impl fmt::Debug for OAuthLoginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthLoginResult")
            .field("has_id_token", &self.id_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("issuing_url", &self.issuing_url)
            .field("user_name", &self.user_name)
            .field("user_email", &self.user_email)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchange a refresh token at the issuing URL.
pub async fn refresh_token_grant(
    http: &reqwest::Client,
    issuing_url: &str,
    client_id: &str,
    refresh_token: &str,
) -> Result<OAuthLoginResult> {
    token_request(
        http,
        issuing_url,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
        ],
    )
    .await
}

/// Machine-to-machine login with a client id and secret.
pub async fn client_credentials_grant(
    http: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    scope: &str,
) -> Result<OAuthLoginResult> {
    token_request(
        http,
        token_endpoint,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", scope),
        ],
    )
    .await
}

/// Exchange an authorization code received on the loopback callback.
pub async fn authorization_code_grant(
    http: &reqwest::Client,
    token_url: &str,
    code: &str,
    redirect_uri: &str,
    client_id: &str,
) -> Result<OAuthLoginResult> {
    token_request(
        http,
        token_url,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
        ],
    )
    .await
}

async fn token_request(
    http: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<OAuthLoginResult> {
    debug!(target: "odahu_api::auth", "Requesting token from {}", url);

    let response = http
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|source| OdahuError::Connection {
            url: url.to_string(),
            source,
        })?;

    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|source| OdahuError::Connection {
            url: url.to_string(),
            source,
        })?;

    if status != 200 {
        let answer =
            serde_json::from_slice(&body).unwrap_or_else(|_| Value::Object(Default::default()));
        return Err(OdahuError::from_status(status, answer));
    }

    let tokens: TokenResponse = serde_json::from_slice(&body)?;
    login_result(tokens, url)
}

#[allow(clippy::result_large_err)]
fn login_result(tokens: TokenResponse, issuing_url: &str) -> Result<OAuthLoginResult> {
    let access_token = match (tokens.access_token, &tokens.id_token) {
        (Some(access), _) => access,
        (None, Some(id)) => id.clone(),
        (None, None) => {
            return Err(OdahuError::Validation(
                "Token response contains neither id_token nor access_token".to_string(),
            ))
        }
    };

    let claims = tokens.id_token.as_deref().and_then(jwt_claims);
    let claim = |name: &str| {
        claims
            .as_ref()
            .and_then(|c| c.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Ok(OAuthLoginResult {
        user_name: claim("name"),
        user_email: claim("email"),
        id_token: tokens.id_token,
        access_token,
        refresh_token: tokens.refresh_token,
        issuing_url: issuing_url.to_string(),
    })
}

/// Decode JWT claims without verifying the signature.
pub fn jwt_claims(token: &str) -> Option<Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Random CSRF state of ASCII letters.
pub fn random_state() -> String {
    (0..STATE_LENGTH)
        .map(|_| STATE_ALPHABET[rand::random_range(0..STATE_ALPHABET.len())] as char)
        .collect()
}

/// Build the authorization-code redirect shown to the user.
///
/// Scheme, host and path are taken from `auth_url`; its query is replaced.
#[allow(clippy::result_large_err)]
pub fn authorization_redirect(
    auth_url: &str,
    client_id: &str,
    state: &str,
    redirect_uri: &str,
    scope: &str,
) -> Result<String> {
    let mut url = url::Url::parse(auth_url)
        .map_err(|e| OdahuError::Validation(format!("Invalid authorization URL {auth_url}: {e}")))?;
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("state", state)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope);
    Ok(url.into())
}
