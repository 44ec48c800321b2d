//! The network collaborator behind [`HttpClient`](crate::HttpClient).
//!
//! A [`Transport`] moves a fully assembled request over the wire and hands
//! back the status, headers and raw (still content-encoded) body. Everything
//! else (headers, signing, parsing, error classification) happens in the
//! client.

mod hyper_client;
mod upload_body;

pub use hyper_client::HyperTransport;

use crate::error::BoxError;
use crate::progress::UploadProgress;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Request as handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Deadline for the whole exchange, body included
    pub timeout: Duration,
    pub follow_redirects: bool,
    /// Reported while the body is sent, never before the connection is up
    pub progress: Option<UploadProgress>,
}

/// Response as returned by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Body bytes exactly as received, before any content decoding
    pub body: Bytes,
}

/// Failure that prevented obtaining an HTTP response.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The exchange did not finish within the request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// DNS resolution or TCP connect failed
    #[error("Connection failed: {0}")]
    Connect(#[source] BoxError),

    /// TLS handshake or certificate validation failed
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// The connection broke while sending or receiving
    #[error("I/O error: {0}")]
    Io(#[source] BoxError),

    /// Response body exceeded the configured size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// The request could not be expressed as an HTTP message
    #[error("Failed to build request: {0}")]
    InvalidRequest(#[from] http::Error),
}

impl TransportError {
    /// Whether repeating the request may succeed.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_) | TransportError::Connect(_) | TransportError::Io(_)
        )
    }
}

/// Executes HTTP exchanges.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    /// Returns a `TransportError` when no HTTP response could be obtained.
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
