// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed client settings resolved from the config file and environment.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::store::{ConfigStore, DEFAULT_SECTION};
use crate::error::{OdahuError, Result};

pub const ENV_API_URL: &str = "API_URL";
pub const ENV_API_TOKEN: &str = "API_TOKEN";
pub const ENV_API_REFRESH_TOKEN: &str = "API_REFRESH_TOKEN";
pub const ENV_API_ACCESS_TOKEN: &str = "API_ACCESS_TOKEN";
pub const ENV_API_ISSUING_URL: &str = "API_ISSUING_URL";
pub const ENV_ISSUER_URL: &str = "ISSUER_URL";
pub const ENV_OAUTH_CLIENT_ID: &str = "ODAHUFLOWCTL_OAUTH_CLIENT_ID";
pub const ENV_OAUTH_CLIENT_SECRET: &str = "ODAHUFLOWCTL_OAUTH_CLIENT_SECRET";
pub const ENV_OAUTH_SCOPE: &str = "ODAHUFLOWCTL_OAUTH_SCOPE";
pub const ENV_OAUTH_LOOPBACK_HOST: &str = "ODAHUFLOWCTL_OAUTH_LOOPBACK_HOST";
pub const ENV_OAUTH_LOOPBACK_URL: &str = "ODAHUFLOWCTL_OAUTH_LOOPBACK_URL";
pub const ENV_OAUTH_AUTH_URL: &str = "ODAHUFLOWCTL_OAUTH_AUTH_URL";
pub const ENV_OAUTH_TOKEN_ISSUING_URL: &str = "ODAHUFLOWCTL_OAUTH_TOKEN_ISSUING_URL";
pub const ENV_NONINTERACTIVE: &str = "ODAHUFLOWCTL_NONINTERACTIVE";
pub const ENV_RETRY_ATTEMPTS: &str = "RETRY_ATTEMPTS";
pub const ENV_BACKOFF_FACTOR: &str = "BACKOFF_FACTOR";
pub const ENV_API_TIMEOUT: &str = "API_TIMEOUT";

/// Resolved client settings.
///
/// Every variable is looked up in the config file section first; a non-empty
/// environment variable of the same name wins over the file, and the default
/// applies when neither is set.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub api_token: Option<String>,
    pub api_refresh_token: Option<String>,
    pub api_access_token: Option<String>,
    pub api_issuing_url: Option<String>,
    pub issuer_url: Option<String>,
    pub oauth_client_id: String,
    pub oauth_client_secret: Option<String>,
    pub oauth_scope: String,
    pub oauth_loopback_host: String,
    pub oauth_loopback_url: String,
    pub oauth_auth_url: Option<String>,
    pub oauth_token_issuing_url: Option<String>,
    /// Forbids the interactive browser login even for clients that ask for
    /// it. Clients are non-interactive unless they opt in.
    pub non_interactive: bool,
    pub retry_attempts: u32,
    pub backoff_factor: f64,
    /// Zero disables the timeout.
    pub api_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            api_token: None,
            api_refresh_token: None,
            api_access_token: None,
            api_issuing_url: None,
            issuer_url: None,
            oauth_client_id: "legion-cli".to_string(),
            oauth_client_secret: None,
            oauth_scope: "openid profile email offline_access groups".to_string(),
            oauth_loopback_host: "127.0.0.1".to_string(),
            oauth_loopback_url: "/oauth/callback".to_string(),
            oauth_auth_url: None,
            oauth_token_issuing_url: None,
            non_interactive: false,
            retry_attempts: 3,
            backoff_factor: 1.0,
            api_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_url", &self.api_url)
            .field("has_token", &self.api_token.is_some())
            .field("has_refresh_token", &self.api_refresh_token.is_some())
            .field("api_issuing_url", &self.api_issuing_url)
            .field("issuer_url", &self.issuer_url)
            .field("oauth_client_id", &self.oauth_client_id)
            .field("has_client_secret", &self.oauth_client_secret.is_some())
            .field("non_interactive", &self.non_interactive)
            .field("retry_attempts", &self.retry_attempts)
            .field("backoff_factor", &self.backoff_factor)
            .field("api_timeout", &self.api_timeout)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Load settings from the store's default section and the process environment.
    #[allow(clippy::result_large_err)]
    pub fn load(store: &ConfigStore) -> Result<Self> {
        let section = store.section(DEFAULT_SECTION)?;
        Self::from_sources(&section, |name| std::env::var(name).ok())
    }

    /// Re-read the file and environment, replacing the current values.
    #[allow(clippy::result_large_err)]
    pub fn reload(&mut self, store: &ConfigStore) -> Result<()> {
        *self = Self::load(store)?;
        Ok(())
    }

    /// Resolve settings from an explicit file section and environment lookup.
    #[allow(clippy::result_large_err)]
    pub fn from_sources<F>(section: &BTreeMap<String, String>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| -> Option<String> {
            env(name)
                .filter(|v| !v.is_empty())
                .or_else(|| section.get(name).filter(|v| !v.is_empty()).cloned())
        };

        let defaults = Self::default();

        let non_interactive = match lookup(ENV_NONINTERACTIVE) {
            Some(v) => cast_bool(&v),
            None => defaults.non_interactive,
        };

        let retry_attempts = match lookup(ENV_RETRY_ATTEMPTS) {
            Some(v) => v.trim().parse().map_err(|e| {
                OdahuError::Config(format!("{ENV_RETRY_ATTEMPTS} must be an integer: {e}"))
            })?,
            None => defaults.retry_attempts,
        };

        let backoff_factor = match lookup(ENV_BACKOFF_FACTOR) {
            Some(v) => parse_non_negative(ENV_BACKOFF_FACTOR, &v)?,
            None => defaults.backoff_factor,
        };

        let api_timeout = match lookup(ENV_API_TIMEOUT) {
            Some(v) => Duration::try_from_secs_f64(parse_non_negative(ENV_API_TIMEOUT, &v)?)
                .map_err(|e| {
                    OdahuError::Config(format!("{ENV_API_TIMEOUT} is out of range: {e}"))
                })?,
            None => defaults.api_timeout,
        };

        Ok(Self {
            api_url: lookup(ENV_API_URL).unwrap_or(defaults.api_url),
            api_token: lookup(ENV_API_TOKEN),
            api_refresh_token: lookup(ENV_API_REFRESH_TOKEN),
            api_access_token: lookup(ENV_API_ACCESS_TOKEN),
            api_issuing_url: lookup(ENV_API_ISSUING_URL),
            issuer_url: lookup(ENV_ISSUER_URL),
            oauth_client_id: lookup(ENV_OAUTH_CLIENT_ID).unwrap_or(defaults.oauth_client_id),
            oauth_client_secret: lookup(ENV_OAUTH_CLIENT_SECRET),
            oauth_scope: lookup(ENV_OAUTH_SCOPE).unwrap_or(defaults.oauth_scope),
            oauth_loopback_host: lookup(ENV_OAUTH_LOOPBACK_HOST)
                .unwrap_or(defaults.oauth_loopback_host),
            oauth_loopback_url: lookup(ENV_OAUTH_LOOPBACK_URL)
                .unwrap_or(defaults.oauth_loopback_url),
            oauth_auth_url: lookup(ENV_OAUTH_AUTH_URL),
            oauth_token_issuing_url: lookup(ENV_OAUTH_TOKEN_ISSUING_URL),
            non_interactive,
            retry_attempts,
            backoff_factor,
            api_timeout,
        })
    }
}

fn cast_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "y" | "yes"
    )
}

#[allow(clippy::result_large_err)]
fn parse_non_negative(name: &str, value: &str) -> Result<f64> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|e| OdahuError::Config(format!("{name} must be a number: {e}")))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(OdahuError::Config(format!(
            "{name} must be a non-negative number, got {value}"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_sources(&BTreeMap::new(), no_env).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.api_url, "http://localhost:5000");
        assert_eq!(settings.oauth_client_id, "legion-cli");
        assert_eq!(settings.retry_attempts, 3);
        assert!(!settings.non_interactive);
    }

    #[test]
    fn test_file_values() {
        let file = section(&[
            ("API_URL", "https://odahu.example.com"),
            ("API_TOKEN", "file-token"),
            ("RETRY_ATTEMPTS", "5"),
            ("BACKOFF_FACTOR", "0.5"),
        ]);
        let settings = Settings::from_sources(&file, no_env).unwrap();

        assert_eq!(settings.api_url, "https://odahu.example.com");
        assert_eq!(settings.api_token.as_deref(), Some("file-token"));
        assert_eq!(settings.retry_attempts, 5);
        assert_eq!(settings.backoff_factor, 0.5);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = section(&[("API_TOKEN", "file-token"), ("ISSUER_URL", "https://file")]);
        let settings = Settings::from_sources(&file, |name| match name {
            "API_TOKEN" => Some("env-token".to_string()),
            "ISSUER_URL" => Some(String::new()),
            _ => None,
        })
        .unwrap();

        assert_eq!(settings.api_token.as_deref(), Some("env-token"));
        // Empty env values do not shadow the file.
        assert_eq!(settings.issuer_url.as_deref(), Some("https://file"));
    }

    #[test]
    fn test_non_interactive_casting() {
        for (raw, expected) in [("yes", true), ("1", true), ("T", true), ("no", false)] {
            let file = section(&[("ODAHUFLOWCTL_NONINTERACTIVE", raw)]);
            let settings = Settings::from_sources(&file, no_env).unwrap();
            assert_eq!(settings.non_interactive, expected, "value {raw}");
        }
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let file = section(&[("RETRY_ATTEMPTS", "many")]);
        let result = Settings::from_sources(&file, no_env);
        assert!(matches!(result, Err(OdahuError::Config(_))));

        let file = section(&[("BACKOFF_FACTOR", "-1")]);
        let result = Settings::from_sources(&file, no_env);
        assert!(matches!(result, Err(OdahuError::Config(_))));
    }

    #[test]
    fn test_out_of_range_timeout_is_config_error() {
        let file = section(&[("API_TIMEOUT", "1e20")]);
        let result = Settings::from_sources(&file, no_env);
        assert!(matches!(result, Err(OdahuError::Config(_))));

        let file = section(&[("API_TIMEOUT", "0")]);
        let settings = Settings::from_sources(&file, no_env).unwrap();
        assert_eq!(settings.api_timeout, Duration::ZERO);
    }

    #[test]
    fn test_huge_backoff_factor_is_accepted() {
        let file = section(&[("BACKOFF_FACTOR", "1e20")]);
        let settings = Settings::from_sources(&file, no_env).unwrap();
        assert_eq!(settings.backoff_factor, 1e20);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let settings = Settings {
            api_token: Some("very-secret-token".to_string()),
            oauth_client_secret: Some("very-secret-client".to_string()),
            ..Settings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("has_token: true"));
    }

    #[test]
    fn test_reload_picks_up_store_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config"));
        let mut settings = Settings::load(&store).unwrap();

        store
            .update(
                DEFAULT_SECTION,
                [("API_ISSUING_URL", Some("https://idp/token".to_string()))],
            )
            .unwrap();
        settings.reload(&store).unwrap();

        // The environment may also define it; either way it is now set.
        assert!(settings.api_issuing_url.is_some());
    }
}
