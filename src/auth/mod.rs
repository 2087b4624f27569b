// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication state and the login state machine.
//!
//! An [`Authenticator`] owns the credentials of one client. When the
//! transport sees a response that requires login it calls
//! [`Authenticator::login`], which tries, in order:
//!
//! 1. refusing outright when this is already the retry after a login,
//! 2. the refresh-token grant,
//! 3. the client-credentials grant (when the issuer's discovery document
//!    is reachable),
//! 4. the interactive authorization-code flow through a loopback listener,
//! 5. failing with [`OdahuError::IncorrectAuthorizationToken`].
//!
//! Every successful login replaces the in-memory token, shared by all clients
//! derived from the same one, and is written to the config store when one is
//! attached.

mod callback;
mod oauth;
mod oidc;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{
    ConfigStore, Settings, DEFAULT_SECTION, ENV_API_ACCESS_TOKEN, ENV_API_ISSUING_URL,
    ENV_API_REFRESH_TOKEN, ENV_API_TOKEN, ENV_API_URL, ENV_ISSUER_URL,
};
use crate::error::{OdahuError, Result};

pub use callback::{CallbackListener, CodeExchange};
pub use oauth::{
    authorization_code_grant, authorization_redirect, client_credentials_grant, jwt_claims,
    random_state, refresh_token_grant, OAuthLoginResult,
};
pub use oidc::{
    fetch_token_endpoint, OpenIdProviderConfiguration, TOKEN_ENDPOINT,
    WELL_KNOWN_CONFIGURATION_URL,
};

/// Default time to wait for the user to finish an interactive login.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout of token and discovery requests when none is configured.
pub const DEFAULT_IDP_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials of a client and of every client derived from it.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthState {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    /// Token endpoint used for refresh-token exchanges.
    pub issuing_url: Option<String>,
    /// OpenID issuer used for discovery.
    pub issuer_url: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// When false, a failed login falls back to the browser flow.
    pub non_interactive: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            token: None,
            refresh_token: None,
            access_token: None,
            issuing_url: None,
            issuer_url: None,
            client_id: String::new(),
            client_secret: None,
            non_interactive: true,
        }
    }
}

impl AuthState {
    /// Credentials from resolved settings. Always non-interactive; see
    /// [`Authenticator::with_non_interactive`].
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            token: settings.api_token.clone(),
            refresh_token: settings.api_refresh_token.clone(),
            access_token: settings.api_access_token.clone(),
            issuing_url: settings.api_issuing_url.clone(),
            issuer_url: settings.issuer_url.clone(),
            client_id: settings.oauth_client_id.clone(),
            client_secret: settings.oauth_client_secret.clone(),
            non_interactive: true,
        }
    }

    fn has_refresh_token(&self) -> bool {
        non_empty(&self.refresh_token) && non_empty(&self.issuing_url)
    }

    fn credentials_error_status(&self) -> &'static str {
        if non_empty(&self.token) {
            "Credentials are not correct"
        } else {
            "Credentials are missed"
        }
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("has_token", &self.token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("issuing_url", &self.issuing_url)
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("non_interactive", &self.non_interactive)
            .finish_non_exhaustive()
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Settings of the interactive and client-credentials flows.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthConfig {
    pub scope: String,
    pub loopback_host: String,
    pub loopback_url: String,
    /// Authorization endpoint; defaults to where the API redirected us.
    pub auth_url: Option<String>,
    /// Token endpoint for the code exchange; defaults to discovery.
    pub token_issuing_url: Option<String>,
    pub login_timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl OAuthConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scope: settings.oauth_scope.clone(),
            loopback_host: settings.oauth_loopback_host.clone(),
            loopback_url: settings.oauth_loopback_url.clone(),
            auth_url: settings.oauth_auth_url.clone(),
            token_issuing_url: settings.oauth_token_issuing_url.clone(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }
}

/// Whether a response means the client must log in.
///
/// True on `401`, or when the request was redirected (the final URL differs
/// from the one requested). The redirect rule is a heuristic: a proxy that
/// redirects for unrelated reasons also triggers a login.
pub fn login_required(requested: &Url, response: &reqwest::Response) -> bool {
    response.status() == reqwest::StatusCode::UNAUTHORIZED || response.url() != requested
}

/// HTTP client for the identity provider. A zero timeout means none.
fn idp_client(timeout: Duration) -> reqwest::Client {
    let builder = reqwest::Client::builder();
    let builder = if timeout.is_zero() {
        builder
    } else {
        builder.timeout(timeout)
    };
    builder.build().unwrap_or_default()
}

/// Runs the login state machine over credentials shared by a client and
/// all clients derived from it.
///
/// Clones share the same [`AuthState`]: a token renewed through one of them
/// is used by the next request of every other.
#[derive(Clone)]
pub struct Authenticator {
    base_url: String,
    state: Arc<RwLock<AuthState>>,
    login_gate: Arc<Mutex<()>>,
    force_non_interactive: bool,
    oauth: OAuthConfig,
    store: Option<ConfigStore>,
    http: reqwest::Client,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("base_url", &self.base_url)
            .field("state", &*self.read())
            .field("oauth", &self.oauth)
            .field("store", &self.store)
            .finish()
    }
}

impl Authenticator {
    pub fn new(base_url: impl Into<String>, state: AuthState, oauth: OAuthConfig) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::new(RwLock::new(state)),
            login_gate: Arc::new(Mutex::new(())),
            force_non_interactive: false,
            oauth,
            store: None,
            http: idp_client(DEFAULT_IDP_TIMEOUT),
        }
    }

    /// Non-interactive authenticator; `ODAHUFLOWCTL_NONINTERACTIVE` keeps it
    /// that way even if [`Authenticator::with_non_interactive`] asks otherwise.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut auth = Self::new(
            settings.api_url.clone(),
            AuthState::from_settings(settings),
            OAuthConfig::from_settings(settings),
        )
        .with_timeout(settings.api_timeout);
        auth.force_non_interactive = settings.non_interactive;
        auth
    }

    /// Persist renewed credentials to this store.
    #[must_use]
    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific HTTP client for token and discovery requests.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Timeout of token and discovery requests; zero disables it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = idp_client(timeout);
        self
    }

    /// Pass `false` to allow the interactive browser login.
    #[must_use]
    pub fn with_non_interactive(self, non_interactive: bool) -> Self {
        let value = non_interactive || self.force_non_interactive;
        self.write().non_interactive = value;
        self
    }

    /// Snapshot of the current credentials.
    pub fn state(&self) -> AuthState {
        self.read().clone()
    }

    pub fn oauth(&self) -> &OAuthConfig {
        &self.oauth
    }

    pub fn store(&self) -> Option<&ConfigStore> {
        self.store.as_ref()
    }

    /// Current bearer token.
    pub fn token(&self) -> Option<String> {
        self.read().token.clone().filter(|t| !t.is_empty())
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle for a client with another base URL, sharing these credentials.
    pub(crate) fn derive(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self.clone()
        }
    }

    fn exhausted(&self) -> OdahuError {
        OdahuError::IncorrectAuthorizationToken(format!(
            "{} even after refreshing. Please try to log in again",
            self.read().credentials_error_status()
        ))
    }

    /// Authorize the client.
    ///
    /// `url` is the final URL of the response that required login; the
    /// interactive flow builds its redirect from it. `limit_stack` is true
    /// when the request being retried was already sent after a login, in
    /// which case this fails without any network call.
    ///
    /// # Errors
    ///
    /// [`OdahuError::IncorrectAuthorizationToken`] or
    /// [`OdahuError::IncorrectClientCredentials`] when no strategy succeeds.
    pub async fn login(&self, url: &str, limit_stack: bool) -> Result<()> {
        if limit_stack {
            return Err(self.exhausted());
        }
        let _gate = self.login_gate.lock().await;
        self.run_strategies(url).await
    }

    /// Like [`Authenticator::login`], for a request that was sent with
    /// `sent_token`. Returns at once when a client sharing these credentials
    /// has already replaced that token.
    pub async fn renew(
        &self,
        url: &str,
        sent_token: Option<&str>,
        limit_stack: bool,
    ) -> Result<()> {
        if limit_stack {
            return Err(self.exhausted());
        }
        let _gate = self.login_gate.lock().await;

        if let Some(current) = self.token() {
            if Some(current.as_str()) != sent_token {
                debug!(target: "odahu_api::auth", "Token has already been renewed, resending");
                return Ok(());
            }
        }
        self.run_strategies(url).await
    }

    async fn run_strategies(&self, url: &str) -> Result<()> {
        let state = {
            let mut state = self.write();
            if !non_empty(&state.issuer_url) {
                let issuing_url = state.issuing_url.clone();
                state.issuer_url = issuing_url;
            }
            state.clone()
        };

        debug!(target: "odahu_api::auth", "Login required. Trying to refresh a token");

        if state.has_refresh_token() {
            return self.login_with_refresh_token(&state).await;
        }

        if let Some(token_endpoint) = self.discover_for_client_credentials(&state).await {
            return self.login_with_client_credentials(&state, &token_endpoint).await;
        }

        if !state.non_interactive {
            return self.login_interactive(&state, url).await;
        }

        Err(OdahuError::IncorrectAuthorizationToken(format!(
            "{}. Please provide correct temporary token or disable non interactive mode",
            state.credentials_error_status()
        )))
    }

    async fn login_with_refresh_token(&self, state: &AuthState) -> Result<()> {
        let issuing_url = state.issuing_url.as_deref().unwrap_or_default();
        let refresh_token = state.refresh_token.as_deref().unwrap_or_default();
        debug!(target: "odahu_api::auth", "Refresh token for {} has been found, trying to use it", issuing_url);

        match refresh_token_grant(&self.http, issuing_url, &state.client_id, refresh_token).await {
            Ok(result) => {
                self.update_credentials(result);
                Ok(())
            }
            Err(e) => {
                debug!(target: "odahu_api::auth", "Refresh token exchange failed: {}", e);
                Err(OdahuError::IncorrectAuthorizationToken(
                    "Refresh token is not correct. Please login again".to_string(),
                ))
            }
        }
    }

    async fn discover_for_client_credentials(&self, state: &AuthState) -> Option<String> {
        if state.client_id.is_empty() || !non_empty(&state.client_secret) {
            return None;
        }
        let issuer = state.issuer_url.as_deref().filter(|u| !u.is_empty())?;

        match fetch_token_endpoint(&self.http, issuer).await {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                debug!(target: "odahu_api::auth", "OpenID discovery for {} failed: {}", issuer, e);
                None
            }
        }
    }

    async fn login_with_client_credentials(
        &self,
        state: &AuthState,
        token_endpoint: &str,
    ) -> Result<()> {
        let secret = state.client_secret.as_deref().unwrap_or_default();
        match client_credentials_grant(
            &self.http,
            token_endpoint,
            &state.client_id,
            secret,
            &self.oauth.scope,
        )
        .await
        {
            Ok(result) => {
                self.update_credentials(result);
                Ok(())
            }
            Err(e) => {
                debug!(target: "odahu_api::auth", "Client credentials exchange failed: {}", e);
                Err(OdahuError::IncorrectClientCredentials(
                    "Client credentials are not correct. Please login again".to_string(),
                ))
            }
        }
    }

    async fn login_interactive(&self, state: &AuthState, url: &str) -> Result<()> {
        let status = state.credentials_error_status();
        let token_url = self.interactive_token_url(state).await?;
        let auth_url = self.oauth.auth_url.clone().unwrap_or_else(|| url.to_string());

        let listener =
            CallbackListener::bind(&self.oauth.loopback_host, &self.oauth.loopback_url).await?;
        let csrf = random_state();
        let target = authorization_redirect(
            &auth_url,
            &state.client_id,
            &csrf,
            listener.redirect_uri(),
            &self.oauth.scope,
        )?;

        let (handle, rx) = listener.spawn(
            csrf,
            CodeExchange {
                http: self.http.clone(),
                token_url,
                client_id: state.client_id.clone(),
            },
        );

        println!("{status}. \nPlease open {target}");

        let outcome = tokio::time::timeout(self.oauth.login_timeout, rx).await;
        handle.abort();

        match outcome {
            Ok(Ok(Ok(result))) => {
                self.update_credentials(result);
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(OdahuError::IncorrectAuthorizationToken(format!(
                "Interactive login failed: {e}"
            ))),
            Ok(Err(_)) => Err(OdahuError::IncorrectAuthorizationToken(
                "Interactive login was interrupted".to_string(),
            )),
            Err(_) => Err(OdahuError::IncorrectAuthorizationToken(format!(
                "{status}. Interactive login timed out after {:?}",
                self.oauth.login_timeout
            ))),
        }
    }

    async fn interactive_token_url(&self, state: &AuthState) -> Result<String> {
        if let Some(url) = self.oauth.token_issuing_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        match state.issuer_url.as_deref().filter(|u| !u.is_empty()) {
            Some(issuer) => fetch_token_endpoint(&self.http, issuer).await.map_err(|e| {
                OdahuError::IncorrectAuthorizationToken(format!(
                    "Can not discover token endpoint of {issuer}: {e}"
                ))
            }),
            None => Err(OdahuError::IncorrectAuthorizationToken(format!(
                "{}. Token issuing URL is not configured",
                state.credentials_error_status()
            ))),
        }
    }

    /// Adopt a login result and persist it.
    ///
    /// A failed write to the config store is logged; the new credentials
    /// stay in effect for this process.
    pub fn update_credentials(&self, result: OAuthLoginResult) {
        let persisted = {
            let mut state = self.write();
            state.token = Some(result.token().to_string());
            state.refresh_token = result.refresh_token.clone();
            state.access_token = Some(result.access_token.clone());
            state.issuing_url = Some(result.issuing_url.clone());
            [
                (ENV_API_URL, Some(self.base_url.clone())),
                (ENV_API_TOKEN, state.token.clone()),
                (ENV_API_REFRESH_TOKEN, state.refresh_token.clone()),
                (ENV_API_ACCESS_TOKEN, state.access_token.clone()),
                (ENV_ISSUER_URL, state.issuer_url.clone()),
                (ENV_API_ISSUING_URL, state.issuing_url.clone()),
            ]
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.update(DEFAULT_SECTION, persisted) {
                warn!(
                    target: "odahu_api::auth",
                    "Can not save credentials to {}: {}",
                    store.path().display(),
                    e
                );
            }
        }

        info!(
            target: "odahu_api::auth",
            "You have been authorized on endpoint {} as {} / {}",
            self.base_url,
            result.user_name.as_deref().unwrap_or("unknown"),
            result.user_email.as_deref().unwrap_or("unknown")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockResponse, MockServer};
    use serde_json::json;

    fn state() -> AuthState {
        AuthState {
            client_id: "legion-cli".to_string(),
            non_interactive: true,
            ..AuthState::default()
        }
    }

    fn authenticator(state: AuthState) -> Authenticator {
        Authenticator::new("http://api", state, OAuthConfig::default())
    }

    #[tokio::test]
    async fn test_limit_stack_fails_without_network() {
        let auth = authenticator(AuthState {
            token: Some("old".to_string()),
            refresh_token: Some("r".to_string()),
            issuing_url: Some("http://127.0.0.1:9/token".to_string()),
            ..state()
        });

        let err = auth.login("http://api/x", true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Credentials are not correct even after refreshing. Please try to log in again"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_non_interactive() {
        let auth = authenticator(state());

        let err = auth.login("http://api/x", false).await.unwrap_err();
        assert!(matches!(err, OdahuError::IncorrectAuthorizationToken(_)));
        assert!(err.to_string().starts_with("Credentials are missed."));
    }

    #[tokio::test]
    async fn test_refresh_token_login_persists() {
        let idp = MockServer::start();
        idp.on(
            "POST",
            "/token",
            MockResponse::json(
                200,
                json!({"id_token": "new-id", "access_token": "new-acc", "refresh_token": "new-ref"}),
            ),
        );
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config"));
        let issuing_url = format!("{}/token", idp.url());

        let auth = authenticator(AuthState {
            refresh_token: Some("old-ref".to_string()),
            issuing_url: Some(issuing_url.clone()),
            ..state()
        })
        .with_store(store.clone());

        auth.login("http://api/x", false).await.unwrap();

        assert_eq!(auth.token().as_deref(), Some("new-id"));
        let section = store.section(DEFAULT_SECTION).unwrap();
        assert_eq!(section["API_TOKEN"], "new-id");
        assert_eq!(section["API_REFRESH_TOKEN"], "new-ref");
        assert_eq!(section["API_ACCESS_TOKEN"], "new-acc");
        assert_eq!(section["API_ISSUING_URL"], issuing_url);
        // Issuer defaults to the issuing URL.
        assert_eq!(section["ISSUER_URL"], issuing_url);
        assert_eq!(section["API_URL"], "http://api");
    }

    #[tokio::test]
    async fn test_bad_refresh_token() {
        let idp = MockServer::start();
        idp.on("POST", "/token", MockResponse::json(400, json!({"error": "invalid_grant"})));

        let auth = authenticator(AuthState {
            refresh_token: Some("old-ref".to_string()),
            issuing_url: Some(format!("{}/token", idp.url())),
            ..state()
        });

        let err = auth.login("http://api/x", false).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Refresh token is not correct. Please login again"
        );
    }

    #[tokio::test]
    async fn test_client_credentials_login() {
        let idp = MockServer::start();
        idp.on(
            "GET",
            "/.well-known/openid-configuration",
            MockResponse::json(200, json!({"token_endpoint": format!("{}/token", idp.url())})),
        );
        idp.on(
            "POST",
            "/token",
            MockResponse::json(200, json!({"access_token": "svc-token"})),
        );

        let auth = authenticator(AuthState {
            client_id: "svc".to_string(),
            client_secret: Some("secret".to_string()),
            issuer_url: Some(idp.url()),
            ..state()
        });

        auth.login("http://api/x", false).await.unwrap();
        assert_eq!(auth.token().as_deref(), Some("svc-token"));
        assert_eq!(auth.state().issuing_url, Some(format!("{}/token", idp.url())));
    }

    #[tokio::test]
    async fn test_client_credentials_rejected() {
        let idp = MockServer::start();
        idp.on(
            "GET",
            "/.well-known/openid-configuration",
            MockResponse::json(200, json!({"token_endpoint": format!("{}/token", idp.url())})),
        );
        idp.on("POST", "/token", MockResponse::json(401, json!({})));

        let auth = authenticator(AuthState {
            client_secret: Some("wrong".to_string()),
            issuer_url: Some(idp.url()),
            ..state()
        });

        let err = auth.login("http://api/x", false).await.unwrap_err();
        assert!(matches!(err, OdahuError::IncorrectClientCredentials(_)));
    }

    #[tokio::test]
    async fn test_discovery_failure_falls_through() {
        let idp = MockServer::start();

        let auth = authenticator(AuthState {
            token: Some("stale".to_string()),
            client_secret: Some("secret".to_string()),
            issuer_url: Some(idp.url()),
            ..state()
        });

        let err = auth.login("http://api/x", false).await.unwrap_err();
        assert!(err.to_string().starts_with("Credentials are not correct."));
        // Only the discovery request reached the issuer.
        assert_eq!(idp.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_interactive_login_times_out() {
        let auth = Authenticator::new(
            "http://api",
            AuthState {
                non_interactive: false,
                ..state()
            },
            OAuthConfig {
                auth_url: Some("https://idp.example.com/auth".to_string()),
                token_issuing_url: Some("https://idp.example.com/token".to_string()),
                ..OAuthConfig::default()
            }
            .with_login_timeout(Duration::from_millis(50)),
        );

        let err = auth.login("http://api/x", false).await.unwrap_err();
        assert!(matches!(err, OdahuError::IncorrectAuthorizationToken(_)));
        assert!(err.to_string().contains("timed out"));
    }

    fn refreshable(idp: &MockServer) -> AuthState {
        AuthState {
            token: Some("old".to_string()),
            refresh_token: Some("old-ref".to_string()),
            issuing_url: Some(format!("{}/token", idp.url())),
            ..state()
        }
    }

    #[tokio::test]
    async fn test_derived_handles_share_renewed_token() {
        let idp = MockServer::start();
        idp.on(
            "POST",
            "/token",
            MockResponse::json(200, json!({"id_token": "new-id", "refresh_token": "new-ref"})),
        );

        let auth = authenticator(refreshable(&idp));
        let derived = auth.derive("http://api");
        derived.login("http://api/x", false).await.unwrap();

        assert_eq!(auth.token().as_deref(), Some("new-id"));
        assert_eq!(auth.state().refresh_token.as_deref(), Some("new-ref"));
    }

    #[tokio::test]
    async fn test_renew_skips_already_replaced_token() {
        let idp = MockServer::start();
        let auth = authenticator(AuthState {
            token: Some("new".to_string()),
            ..refreshable(&idp)
        });

        auth.renew("http://api/x", Some("old"), false).await.unwrap();
        assert!(idp.requests().is_empty());
        assert_eq!(auth.token().as_deref(), Some("new"));

        let err = auth.renew("http://api/x", Some("old"), true).await.unwrap_err();
        assert!(err.to_string().contains("even after refreshing"));
    }

    #[tokio::test]
    async fn test_store_write_failure_keeps_login() {
        let idp = MockServer::start();
        idp.on(
            "POST",
            "/token",
            MockResponse::json(200, json!({"id_token": "new-id"})),
        );
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let auth = authenticator(refreshable(&idp))
            .with_store(ConfigStore::new(blocker.join("config")));

        auth.login("http://api/x", false).await.unwrap();
        assert_eq!(auth.token().as_deref(), Some("new-id"));
    }

    #[tokio::test]
    async fn test_stalled_identity_provider_times_out() {
        // Accepts connections and never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let issuing_url = format!("http://{}/token", listener.local_addr().unwrap());

        let auth = authenticator(AuthState {
            refresh_token: Some("old-ref".to_string()),
            issuing_url: Some(issuing_url),
            ..state()
        })
        .with_timeout(Duration::from_millis(200));

        let outcome =
            tokio::time::timeout(Duration::from_secs(10), auth.login("http://api/x", false)).await;
        assert!(outcome.expect("login hung past the IdP timeout").is_err());
        drop(listener);
    }

    #[test]
    fn test_interactive_requires_opt_in() {
        assert!(Authenticator::from_settings(&Settings::default())
            .state()
            .non_interactive);

        let opted_in = Authenticator::from_settings(&Settings::default()).with_non_interactive(false);
        assert!(!opted_in.state().non_interactive);

        let forced = Settings {
            non_interactive: true,
            ..Settings::default()
        };
        let auth = Authenticator::from_settings(&forced).with_non_interactive(false);
        assert!(auth.state().non_interactive);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let auth = authenticator(AuthState {
            token: Some("super-secret".to_string()),
            client_secret: Some("also-secret".to_string()),
            ..state()
        });
        let debug = format!("{auth:?}");
        assert!(!debug.contains("also-secret"));
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("has_token: true"));
    }
}
