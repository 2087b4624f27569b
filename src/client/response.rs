// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response handling: status classification, JSON decoding and line streams.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::debug;

use crate::error::{OdahuError, Result};

/// Decode a buffered response body and classify its status.
///
/// A body that is not JSON decodes to an empty object. `409` raises
/// [`OdahuError::EntityAlreadyExists`], any other `[400, 600)` status raises
/// [`OdahuError::WrongHttpStatusCode`].
#[allow(clippy::result_large_err)]
pub fn handle_query_response(status: u16, body: &[u8]) -> Result<Value> {
    let answer = match serde_json::from_slice::<Value>(body) {
        Ok(answer) => {
            debug!(target: "odahu_api::http", "Got answer with code {}", status);
            answer
        }
        Err(_) => Value::Object(Default::default()),
    };

    if (400..600).contains(&status) {
        return Err(OdahuError::from_status(status, answer));
    }

    Ok(answer)
}

/// Splits a byte stream into text lines across chunk boundaries.
///
/// Handles `\n` and `\r\n`. Bytes are buffered until a full line is seen,
/// so multi-byte UTF-8 sequences split between chunks decode intact.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the lines it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush the unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Lazy sequence of text lines read from a streamed response body.
///
/// The sequence ends when the server closes the stream. It is not
/// restartable; issue a new request for a fresh stream.
#[derive(Debug)]
pub struct LineStream {
    url: String,
    response: Option<reqwest::Response>,
    decoder: LineDecoder,
    ready: VecDeque<String>,
}

impl LineStream {
    /// Wrap a response, raising up front if its status is `[400, 600)`.
    pub(crate) async fn open(url: String, response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        if (400..600).contains(&status) {
            let body = response.bytes().await.unwrap_or_default();
            let answer = serde_json::from_slice(&body)
                .unwrap_or_else(|_| Value::Object(Default::default()));
            return Err(OdahuError::WrongHttpStatusCode {
                status,
                message: message_of(status, &answer),
                body: answer,
            });
        }

        Ok(Self {
            url,
            response: Some(response),
            decoder: LineDecoder::new(),
            ready: VecDeque::new(),
        })
    }

    /// Next line, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(Ok(line));
            }

            let response = self.response.as_mut()?;
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    let lines = self.decoder.feed(&bytes);
                    self.ready.extend(lines);
                }
                Ok(None) => {
                    self.response = None;
                    if let Some(rest) = self.decoder.finish() {
                        self.ready.push_back(rest);
                    }
                }
                Err(source) => {
                    self.response = None;
                    return Some(Err(OdahuError::Connection {
                        url: self.url.clone(),
                        source,
                    }));
                }
            }
        }
    }

    /// Drain the stream into a vector.
    pub async fn collect_lines(mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await {
            lines.push(line?);
        }
        Ok(lines)
    }
}

fn message_of(status: u16, answer: &Value) -> String {
    match OdahuError::from_status(status, answer.clone()) {
        OdahuError::WrongHttpStatusCode { message, .. }
        | OdahuError::EntityAlreadyExists { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_body_is_returned() {
        let body = handle_query_response(200, br#"{"id":"a"}"#).unwrap();
        assert_eq!(body, json!({"id": "a"}));
    }

    #[test]
    fn test_non_json_body_is_empty_object() {
        assert_eq!(handle_query_response(200, b"OK").unwrap(), json!({}));
        assert_eq!(handle_query_response(204, b"").unwrap(), json!({}));
    }

    #[test]
    fn test_conflict_and_wrong_status() {
        let err = handle_query_response(409, br#"{"message":"exists"}"#).unwrap_err();
        assert!(matches!(err, OdahuError::EntityAlreadyExists { .. }));

        let err = handle_query_response(503, b"<html>").unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn test_line_decoder_splits_across_chunks() {
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.feed(b"first li"), Vec::<String>::new());
        assert_eq!(decoder.feed(b"ne\r\nsecond\nthi"), vec!["first line", "second"]);
        assert_eq!(decoder.feed(b"rd"), Vec::<String>::new());
        assert_eq!(decoder.finish(), Some("third".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_line_decoder_keeps_empty_lines_and_utf8() {
        let mut decoder = LineDecoder::new();
        let text = "a\n\nпривет\n".as_bytes();
        let (head, tail) = text.split_at(5);
        let mut lines = decoder.feed(head);
        lines.extend(decoder.feed(tail));
        assert_eq!(lines, vec!["a", "", "привет"]);
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_line_stream_error_status_raised_up_front() {
        let response: reqwest::Response = http::Response::builder()
            .status(404)
            .body(r#"{"message":"training t1 not found"}"#)
            .unwrap()
            .into();

        let err = LineStream::open("http://x/log".to_string(), response)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("training t1 not found"));
    }

    #[tokio::test]
    async fn test_line_stream_yields_lines() {
        let response: reqwest::Response = http::Response::builder()
            .status(200)
            .body("line 1\nline 2\nline 3")
            .unwrap()
            .into();

        let stream = LineStream::open("http://x/log".to_string(), response)
            .await
            .unwrap();
        assert_eq!(
            stream.collect_lines().await.unwrap(),
            vec!["line 1", "line 2", "line 3"]
        );
    }
}
