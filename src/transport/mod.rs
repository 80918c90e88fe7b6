//! HTTP transport for the BookBot backend
//!
//! Handles:
//! - Plain JSON request/response with typed error normalization
//! - The long-lived chat push stream (SSE) with caller-side cancellation
//! - Multipart uploads with monotonic progress reporting
//!
//! The [`Transport`] trait is the substitution seam: production code uses
//! [`HttpTransport`], tests and demos plug in their own implementation.

mod sse;

pub use sse::SseFrames;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ApiConfig;

/// Upload progress callback, invoked with a percentage in `[0, 100]`
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Transport-level failures
///
/// `Network` means no response was received at all; it is never conflated
/// with a server-reported error. `Server` carries the numeric status plus
/// a single human-readable message taken from the error payload's
/// `detail` field when present, else the status-line text.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response received (connection refused, timeout, DNS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the server
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Response body was not the JSON we were promised
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// Normalize a non-2xx response body into a `Server` error
    ///
    /// Expects `{ "detail": "..." }`; any other shape degrades to the
    /// canonical reason for the status code.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("detail")?.as_str().map(str::to_string));

        let message = detail.unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Request failed")
                .to_string()
        });

        TransportError::Server { status, message }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            TransportError::Network(format!("Connection failed: {e}"))
        } else {
            TransportError::Network(e.to_string())
        }
    }

    /// Whether retrying the triggering action may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Server { status, .. } => *status >= 500,
            TransportError::Decode(_) => false,
        }
    }
}

/// A cancellable push-source of raw SSE payload strings
///
/// `next()` yields payloads until the stream ends (`None`) or fails.
/// Dropping the stream, or calling [`EventStream::cancel`], aborts the
/// reader task; cancelling after the stream has ended is a no-op.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    reader: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Next raw payload, or `None` once the stream has ended
    pub async fn next(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await
    }

    /// Stop reading and abort the underlying connection
    pub fn cancel(&mut self) {
        self.rx.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    /// Build a stream from pre-recorded payloads
    ///
    /// Used by substitute transports in tests and demos.
    pub fn from_payloads(payloads: Vec<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for p in payloads {
            let _ = tx.send(Ok(p));
        }
        Self { rx, reader: None }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Backend transport seam
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a JSON request; `Ok(Value::Null)` for empty (204) bodies
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;

    /// Open the server-push stream for `path` with the given query params
    async fn open_stream(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<EventStream, TransportError>;

    /// Upload a file as multipart form data, reporting progress
    async fn upload(
        &self,
        path: &str,
        field: &str,
        filename: &str,
        data: Vec<u8>,
        progress: Option<ProgressFn>,
    ) -> Result<Value, TransportError>;
}

/// Monotonic percentage gauge for upload progress
///
/// Only yields a value when the percentage actually increases, so callers
/// never observe a regression or a duplicate.
#[derive(Debug)]
pub(crate) struct ProgressGauge {
    total: u64,
    sent: u64,
    last: Option<u8>,
}

impl ProgressGauge {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total,
            sent: 0,
            last: None,
        }
    }

    pub(crate) fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.sent = (self.sent + bytes).min(self.total);
        let pct = if self.total == 0 {
            100
        } else {
            (self.sent * 100 / self.total) as u8
        };
        if self.last.map_or(true, |last| pct > last) {
            self.last = Some(pct);
            Some(pct)
        } else {
            None
        }
    }
}

/// Production transport over `reqwest`
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn json_body(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let mut req = self.client.request(method.clone(), self.endpoint(path));
        if let Some(body) = body {
            req = req.json(&body);
        }

        tracing::debug!("{} {}", method, path);
        let response = req.send().await.map_err(TransportError::from_reqwest)?;
        Self::json_body(response).await
    }

    async fn open_stream(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<EventStream, TransportError> {
        let url = url::Url::parse_with_params(&self.endpoint(path), params)
            .map_err(|e| TransportError::Network(format!("Invalid stream URL: {e}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), &body));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut frames = SseFrames::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for payload in frames.feed(&bytes) {
                            if tx.send(Ok(payload)).is_err() {
                                // Receiver cancelled; stop reading.
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(TransportError::Network(format!(
                            "Stream interrupted: {e}"
                        ))));
                        return;
                    }
                }
            }
            for payload in frames.drain() {
                let _ = tx.send(Ok(payload));
            }
        });

        Ok(EventStream {
            rx,
            reader: Some(reader),
        })
    }

    async fn upload(
        &self,
        path: &str,
        field: &str,
        filename: &str,
        data: Vec<u8>,
        progress: Option<ProgressFn>,
    ) -> Result<Value, TransportError> {
        const CHUNK: usize = 64 * 1024;

        let total = data.len() as u64;
        let mut gauge = ProgressGauge::new(total);
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = data
            .chunks(CHUNK)
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();

        // Progress fires only while body bytes are consumed, never after
        // the request has completed or failed.
        let counted = futures::stream::iter(chunks).inspect(move |chunk| {
            if let (Ok(bytes), Some(cb)) = (chunk, progress.as_ref()) {
                if let Some(pct) = gauge.advance(bytes.len() as u64) {
                    cb(pct);
                }
            }
        });

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(counted),
            total,
        )
        .file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part(field.to_string(), part);

        let response = self
            .client
            .post(self.endpoint(path))
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        Self::json_body(response).await
    }
}
