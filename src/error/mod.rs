// SPDX-License-Identifier: MIT OR Apache-2.0

use std::path::PathBuf;

use thiserror::Error;

#[allow(clippy::result_large_err)]
#[derive(Debug, Error)]
pub enum OdahuError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The API server could not be reached (DNS, refused connection, TLS, timeout).
    #[error("Can not reach {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Got error from server: {message} (status: {status})")]
    WrongHttpStatusCode {
        status: u16,
        message: String,
        body: serde_json::Value,
    },

    #[error("Got error from server: {message} (status: 409)")]
    EntityAlreadyExists {
        message: String,
        body: serde_json::Value,
    },

    #[error("{0}")]
    IncorrectAuthorizationToken(String),

    #[error("{0}")]
    IncorrectClientCredentials(String),

    #[error("{0} is invalid resource")]
    InvalidResourceType(String),

    #[error("{0}")]
    Manifest(String),

    #[error("Resource file '{}' not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OdahuError {
    /// Build the error for a `[400, 600)` response, picking 409 out as a conflict.
    ///
    /// The message is the body's `message` field, or the canonical reason
    /// phrase of the status when the body has none.
    pub fn from_status(status: u16, body: serde_json::Value) -> Self {
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| default_reason(status));

        if status == 409 {
            Self::EntityAlreadyExists { message, body }
        } else {
            Self::WrongHttpStatusCode {
                status,
                message,
                body,
            }
        }
    }

    /// HTTP status carried by the error, if it came from a server response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::WrongHttpStatusCode { status, .. } => Some(*status),
            Self::EntityAlreadyExists { .. } => Some(409),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::IncorrectAuthorizationToken(_) | Self::IncorrectClientCredentials(_)
        )
    }
}

fn default_reason(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown status")
        .to_string()
}

pub type Result<T> = std::result::Result<T, OdahuError>;
