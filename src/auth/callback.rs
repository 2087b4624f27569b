// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback listener for the interactive authorization-code flow.
//!
//! The listener serves a single path on an ephemeral port. The first request
//! carrying the expected `state` and a `code` is exchanged for tokens and the
//! outcome is sent on a one-shot channel. Requests for other paths or with a
//! wrong state are answered with an error and the listener keeps waiting.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::oauth::{authorization_code_grant, OAuthLoginResult};
use crate::error::{OdahuError, Result};

const MAX_REQUEST_HEAD: usize = 16 * 1024;

/// Everything needed to turn a callback `code` into tokens.
#[derive(Debug, Clone)]
pub struct CodeExchange {
    pub http: reqwest::Client,
    pub token_url: String,
    pub client_id: String,
}

/// A bound, not yet serving, callback listener.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
    redirect_uri: String,
}

/// What a single callback request carried.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    WrongPath,
    WrongState,
    Missing,
}

impl CallbackListener {
    /// Bind `host` on an ephemeral port, serving `path`.
    pub async fn bind(host: &str, path: &str) -> Result<Self> {
        let listener = TcpListener::bind((host, 0)).await?;
        let port = listener.local_addr()?.port();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let redirect_uri = format!("http://{host}:{port}{path}");

        Ok(Self {
            listener,
            path,
            redirect_uri,
        })
    }

    /// URI the identity provider must redirect back to.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Serve callbacks until one succeeds or fails the code exchange.
    ///
    /// The returned receiver resolves exactly once. Abort the handle to stop
    /// listening early.
    pub fn spawn(
        self,
        state: String,
        exchange: CodeExchange,
    ) -> (JoinHandle<()>, oneshot::Receiver<Result<OAuthLoginResult>>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let outcome = self.serve(&state, &exchange).await;
            let _ = tx.send(outcome);
        });
        (handle, rx)
    }

    async fn serve(self, state: &str, exchange: &CodeExchange) -> Result<OAuthLoginResult> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            debug!(target: "odahu_api::auth", "OAuth callback connection from {}", peer);

            let head = match read_head(&mut stream).await {
                Ok(head) => head,
                Err(e) => {
                    warn!(target: "odahu_api::auth", "Malformed OAuth callback: {}", e);
                    continue;
                }
            };

            match parse_callback(&head, &self.path, state) {
                Callback::Code(code) => {
                    let result = authorization_code_grant(
                        &exchange.http,
                        &exchange.token_url,
                        &code,
                        &self.redirect_uri,
                        &exchange.client_id,
                    )
                    .await;

                    let page = match &result {
                        Ok(_) => (200, "You have been authorized. You can close this tab."),
                        Err(_) => (500, "Authorization failed. See the console for details."),
                    };
                    let _ = respond(&mut stream, page.0, page.1).await;
                    return result;
                }
                Callback::WrongPath => {
                    let _ = respond(&mut stream, 404, "Not found").await;
                }
                Callback::WrongState => {
                    warn!(target: "odahu_api::auth", "OAuth callback with unexpected state was rejected");
                    let _ = respond(&mut stream, 400, "Invalid state").await;
                }
                Callback::Missing => {
                    let _ = respond(&mut stream, 400, "Missing authorization code").await;
                }
            }
        }
    }
}

async fn read_head(stream: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > MAX_REQUEST_HEAD {
            return Err(OdahuError::Validation(
                "OAuth callback request is too large".to_string(),
            ));
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_callback(head: &str, path: &str, expected_state: &str) -> Callback {
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default();

    let url = match url::Url::parse(&format!("http://localhost{target}")) {
        Ok(url) => url,
        Err(_) => return Callback::WrongPath,
    };
    if url.path() != path {
        return Callback::WrongPath;
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Callback::WrongState;
    }
    match code {
        Some(code) if !code.is_empty() => Callback::Code(code),
        _ => Callback::Missing,
    }
}

async fn respond(stream: &mut TcpStream, status: u16, text: &str) -> std::io::Result<()> {
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{text}",
        text.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
