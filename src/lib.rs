// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod apply;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod manifest;
pub mod resources;
pub mod runtime;
pub mod testkit;

pub use apply::{apply, apply_blocking, ApplyError, ApplyResult};
pub use auth::Authenticator;
pub use client::{ApiClient, BlockingApiClient, ClientConfig};
pub use config::{ConfigStore, Settings};
pub use error::{OdahuError, Result};
pub use manifest::{ChangeItem, ChangeSet};
pub use resources::{ResourceKind, ResourceRecord};
