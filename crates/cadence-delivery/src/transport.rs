//! Live transport seam and its HTTP implementation.
//!
//! One request is sent per user turn. The response body is handed back as a
//! stream of raw byte fragments; framing is the parser's job.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cadence_core::config::BackendConfig;
use cadence_core::error::CadenceError;
use cadence_core::types::DeliveryMode;
use futures::{Stream, StreamExt};
use serde::Serialize;

/// Raw body fragments of one live response.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Failures of the live path. Each one ends the delivery with the apology
/// text; none is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("response body unreadable: {0}")]
    UnreadableBody(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("no data received for {0:?}")]
    Timeout(Duration),
}

impl From<TransportError> for CadenceError {
    fn from(err: TransportError) -> Self {
        CadenceError::Transport(err.to_string())
    }
}

/// Body of the per-turn request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRequest {
    pub message: String,
    pub mode: DeliveryMode,
}

/// Opens live deliveries.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Send the request and return the body stream once the backend has
    /// answered with a success status.
    async fn open(&self, request: &DeliveryRequest) -> Result<FrameStream, TransportError>;
}

/// Supplies authentication and other headers, merged into every request
/// unchanged.
pub trait HeaderProvider: Send + Sync {
    fn headers(&self) -> Vec<(String, String)>;
}

/// Fixed header set, typically from `[backend.headers]`.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(BTreeMap<String, String>);

impl StaticHeaders {
    pub fn new(headers: BTreeMap<String, String>) -> Self {
        Self(headers)
    }
}

impl HeaderProvider for StaticHeaders {
    fn headers(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// `reqwest`-backed transport posting JSON to the configured endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: Arc<dyn HeaderProvider>,
}

impl HttpTransport {
    pub fn new(
        config: &BackendConfig,
        headers: Arc<dyn HeaderProvider>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LiveTransport for HttpTransport {
    async fn open(&self, request: &DeliveryRequest) -> Result<FrameStream, TransportError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);
        for (name, value) in self.headers.headers() {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let mut received = false;
        let stream = response.bytes_stream().map(move |item| match item {
            Ok(bytes) => {
                received = true;
                Ok(bytes)
            }
            Err(e) if !received => Err(TransportError::UnreadableBody(e.to_string())),
            Err(e) => Err(TransportError::Stream(e.to_string())),
        });
        Ok(Box::pin(stream))
    }
}
