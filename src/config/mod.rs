// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration management for ODAHU clients
//!
//! Credentials and endpoint settings live in a user-scoped file
//! (typically `~/.odahuflow/config`) organised in named sections of flat
//! key/value pairs. Environment variables with the same names as the keys
//! override file values at read time.
//!
//! # Environment Variables
//!
//! - `ODAHUFLOW_CONFIG` - Path to the config file (default: `~/.odahuflow/config`)
//! - `API_URL`, `API_TOKEN`, `API_REFRESH_TOKEN`, `API_ACCESS_TOKEN`,
//!   `API_ISSUING_URL`, `ISSUER_URL` - endpoint and credentials
//! - `ODAHUFLOWCTL_OAUTH_*` - OAuth2 client settings
//! - `ODAHUFLOWCTL_NONINTERACTIVE` - disable interactive login
//! - `RETRY_ATTEMPTS`, `BACKOFF_FACTOR`, `API_TIMEOUT` - transport tuning
//!
//! # Example
//!
//! ```no_run
//! use odahu_api_rs::config::{ConfigStore, Settings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ConfigStore::open_default()?;
//! let settings = Settings::load(&store)?;
//! println!("Using API at {}", settings.api_url);
//! # Ok(())
//! # }
//! ```

mod settings;
mod store;

pub use settings::{
    Settings, ENV_API_ACCESS_TOKEN, ENV_API_ISSUING_URL, ENV_API_REFRESH_TOKEN, ENV_API_TIMEOUT,
    ENV_API_TOKEN, ENV_API_URL, ENV_BACKOFF_FACTOR, ENV_ISSUER_URL, ENV_NONINTERACTIVE,
    ENV_OAUTH_AUTH_URL, ENV_OAUTH_CLIENT_ID, ENV_OAUTH_CLIENT_SECRET, ENV_OAUTH_LOOPBACK_HOST,
    ENV_OAUTH_LOOPBACK_URL, ENV_OAUTH_SCOPE, ENV_OAUTH_TOKEN_ISSUING_URL, ENV_RETRY_ATTEMPTS,
};
pub use store::{ConfigStore, DEFAULT_SECTION, ENV_ODAHUFLOW_CONFIG};
