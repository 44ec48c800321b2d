use crate::headers::Header;
use crate::request::RequestInfo;
use crate::response::parse_retry_after;
use crate::security::SOURCE_DATA_LIMIT;
use crate::transport::TransportError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used for opaque sources (transport internals, custom parsers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Coarse error classification returned by [`HttpError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was assembled incorrectly; never retried.
    Configuration,
    /// No HTTP status was obtained (connect, TLS, timeout, I/O).
    Transport,
    /// The response body could not be turned into the expected type.
    Parser,
    /// The server answered with a non-success status.
    Server,
}

/// Invalid request assembly, detected before anything is sent.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// URL scheme other than `http` or `https`
    #[error("URL scheme '{0}' not supported")]
    InvalidScheme(String),

    /// `build()` was called before any URL was set
    #[error("Request URL was never set")]
    MissingUrl,

    /// A body was attached to a method that cannot carry one
    #[error("HTTP method {0} cannot carry a body")]
    BodyNotAllowed(http::Method),

    /// No response parser was bound to the request
    #[error("No response parser set")]
    MissingParser,

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// JSON body serialization error
    #[error("JSON encoding failed: {0}")]
    JsonEncode(#[from] serde_json::Error),

    /// The request signer rejected the request
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// TLS setup failed while building the default transport
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),
}

/// Response body could not be converted into the expected type.
///
/// Carries the name of the transform stage that failed and a bounded copy
/// (at most [`SOURCE_DATA_LIMIT`] bytes) of the data that stage received.
/// Errors returned by the client also keep a prefix of the response body as
/// it arrived on the wire, see [`raw_data`](Self::raw_data).
#[derive(Error, Debug)]
#[error("{stage}: {message}")]
pub struct ParserError {
    stage: &'static str,
    message: String,
    source_data: Option<Bytes>,
    raw_data: Option<Bytes>,
    #[source]
    source: Option<BoxError>,
}

impl ParserError {
    /// Create a parser error raised by `stage`.
    #[must_use]
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            source_data: None,
            raw_data: None,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the data the failing stage received, replacing any previous capture.
    #[must_use]
    pub fn with_source_data<D: SourceData + ?Sized>(mut self, data: &D) -> Self {
        self.source_data = Some(data.source_bytes());
        self
    }

    /// Attach the data only when no stage captured any yet.
    #[must_use]
    pub fn or_source_data<D: SourceData + ?Sized>(mut self, data: &D) -> Self {
        if self.source_data.is_none() {
            self.source_data = Some(data.source_bytes());
        }
        self
    }

    /// Attach a prefix of the response body as received, before any stage ran.
    #[must_use]
    pub fn with_raw_data(mut self, body: &Bytes) -> Self {
        self.raw_data = Some(body.source_bytes());
        self
    }

    /// Name of the stage that failed.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Human readable failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix of the data the failing stage was working on.
    #[must_use]
    pub fn source_data(&self) -> Option<&Bytes> {
        self.source_data.as_ref()
    }

    /// Prefix of the undecoded response body, unchanged by any stage.
    #[must_use]
    pub fn raw_data(&self) -> Option<&Bytes> {
        self.raw_data.as_ref()
    }
}

/// Values that can be kept inside a [`ParserError`] for debugging.
pub trait SourceData {
    /// Bounded byte copy of the value.
    fn source_bytes(&self) -> Bytes;
}

impl SourceData for Bytes {
    fn source_bytes(&self) -> Bytes {
        self.slice(..self.len().min(SOURCE_DATA_LIMIT))
    }
}

impl SourceData for [u8] {
    fn source_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self[..self.len().min(SOURCE_DATA_LIMIT)])
    }
}

impl SourceData for String {
    fn source_bytes(&self) -> Bytes {
        self.as_bytes().source_bytes()
    }
}

impl SourceData for str {
    fn source_bytes(&self) -> Bytes {
        self.as_bytes().source_bytes()
    }
}

impl SourceData for serde_json::Value {
    fn source_bytes(&self) -> Bytes {
        self.to_string().as_bytes().source_bytes()
    }
}

impl SourceData for () {
    fn source_bytes(&self) -> Bytes {
        Bytes::new()
    }
}

/// Non-success HTTP status with best-effort diagnostics from the error body.
#[derive(Debug)]
pub struct ServerError {
    request: RequestInfo,
    status: StatusCode,
    headers: HeaderMap,
    content_type: Option<String>,
    retry_after: Option<Duration>,
    message: Option<String>,
    server_error: Option<serde_json::Value>,
}

impl ServerError {
    /// Bare server error carrying only the status line and headers.
    #[must_use]
    pub fn new(request: RequestInfo, status: StatusCode, headers: HeaderMap) -> Self {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let retry_after = parse_retry_after(&headers);
        Self {
            request,
            status,
            headers,
            content_type,
            retry_after,
            message: None,
            server_error: None,
        }
    }

    /// Request that produced this error.
    #[must_use]
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response headers flattened into name/value pairs.
    ///
    /// Values that are not valid UTF-8 are skipped.
    #[must_use]
    pub fn received_headers(&self) -> Vec<Header> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| Header::new(name.as_str(), value))
            })
            .collect()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Parsed `Retry-After` header value, if present and valid.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Message extracted from the error body (JSON string form or text).
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Structured error payload sent by the server, when it was JSON.
    #[must_use]
    pub fn server_error(&self) -> Option<&serde_json::Value> {
        self.server_error.as_ref()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn set_server_error(&mut self, value: serde_json::Value) {
        self.server_error = Some(value);
    }

    /// Advisory flag: the same request may succeed later (status >= 500).
    #[must_use]
    pub fn is_temporary_failure(&self) -> bool {
        self.status.is_server_error()
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} for {}", self.status, self.request)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}

/// Error returned by [`HttpClient::dispatch`](crate::HttpClient::dispatch).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request assembly failed
    #[error("Invalid request configuration: {source}")]
    Config {
        /// Request being dispatched, `None` for builder-time failures
        request: Option<RequestInfo>,
        #[source]
        source: ConfigError,
    },

    /// No HTTP status could be obtained
    #[error("Transport error for {request}: {source}")]
    Transport {
        request: RequestInfo,
        #[source]
        source: TransportError,
    },

    /// Successful response whose body could not be parsed
    #[error("Failed to parse response for {request}: {source}")]
    Parser {
        request: RequestInfo,
        status: StatusCode,
        #[source]
        source: ParserError,
    },

    /// Non-success HTTP status
    #[error("{0}")]
    Server(Box<ServerError>),
}

impl From<ConfigError> for HttpError {
    fn from(source: ConfigError) -> Self {
        HttpError::Config {
            request: None,
            source,
        }
    }
}

impl From<ServerError> for HttpError {
    fn from(err: ServerError) -> Self {
        HttpError::Server(Box::new(err))
    }
}

impl HttpError {
    pub(crate) fn config(request: RequestInfo, source: ConfigError) -> Self {
        HttpError::Config {
            request: Some(request),
            source,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            HttpError::Config { .. } => ErrorKind::Configuration,
            HttpError::Transport { .. } => ErrorKind::Transport,
            HttpError::Parser { .. } => ErrorKind::Parser,
            HttpError::Server(_) => ErrorKind::Server,
        }
    }

    /// Request that failed, when the failure happened during dispatch.
    #[must_use]
    pub fn request(&self) -> Option<&RequestInfo> {
        match self {
            HttpError::Config { request, .. } => request.as_ref(),
            HttpError::Transport { request, .. } | HttpError::Parser { request, .. } => {
                Some(request)
            }
            HttpError::Server(err) => Some(err.request()),
        }
    }

    /// HTTP status received before the failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Parser { status, .. } => Some(*status),
            HttpError::Server(err) => Some(err.status()),
            HttpError::Config { .. } | HttpError::Transport { .. } => None,
        }
    }

    /// Advisory retry hint. Nothing in this crate retries on its own.
    #[must_use]
    pub fn is_temporary_failure(&self) -> bool {
        match self {
            HttpError::Transport { source, .. } => source.is_temporary(),
            HttpError::Server(err) => err.is_temporary_failure(),
            HttpError::Config { .. } | HttpError::Parser { .. } => false,
        }
    }

    /// The parser failure, for [`ErrorKind::Parser`] errors.
    #[must_use]
    pub fn parser_error(&self) -> Option<&ParserError> {
        match self {
            HttpError::Parser { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The server failure, for [`ErrorKind::Server`] errors.
    #[must_use]
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            HttpError::Server(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    fn info() -> RequestInfo {
        RequestInfo::new(
            http::Method::GET,
            url::Url::parse("https://api.example.com/items").unwrap(),
        )
    }

    #[test]
    fn test_server_error_temporary_only_for_5xx() {
        let err = ServerError::new(info(), StatusCode::UNAUTHORIZED, HeaderMap::new());
        assert!(!err.is_temporary_failure());

        let err = ServerError::new(info(), StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new());
        assert!(err.is_temporary_failure());

        let err = ServerError::new(info(), StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new());
        assert!(HttpError::from(err).is_temporary_failure());
    }

    #[test]
    fn test_server_error_reads_content_type_and_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, "text/plain".parse().unwrap());
        headers.insert(http::header::RETRY_AFTER, "30".parse().unwrap());

        let err = ServerError::new(info(), StatusCode::TOO_MANY_REQUESTS, headers);
        assert_eq!(err.content_type(), Some("text/plain"));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(err.received_headers().len(), 2);
    }

    #[test]
    fn test_server_error_display_includes_message() {
        let mut err = ServerError::new(info(), StatusCode::NOT_FOUND, HeaderMap::new());
        assert_eq!(
            err.to_string(),
            "HTTP 404 Not Found for GET https://api.example.com/items"
        );

        err.set_message("no such item");
        assert!(err.to_string().ends_with(": no such item"));
    }

    #[test]
    fn test_error_kinds() {
        let err = HttpError::from(ConfigError::MissingUrl);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.request().is_none());
        assert!(!err.is_temporary_failure());

        let err = HttpError::Transport {
            request: info(),
            source: TransportError::Timeout(Duration::from_secs(1)),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_temporary_failure());
        assert!(err.status().is_none());

        let err = HttpError::Parser {
            request: info(),
            status: StatusCode::OK,
            source: ParserError::new("body_to_string", "bad"),
        };
        assert_eq!(err.kind(), ErrorKind::Parser);
        assert_eq!(err.status(), Some(StatusCode::OK));
        assert!(err.parser_error().is_some());
    }

    #[test]
    fn test_parser_error_keeps_first_capture() {
        let err = ParserError::new("json", "Bad JSON data")
            .or_source_data("first")
            .or_source_data("second");
        assert_eq!(err.source_data().unwrap().as_ref(), b"first");

        let err = err.with_source_data("replaced");
        assert_eq!(err.source_data().unwrap().as_ref(), b"replaced");
        assert_eq!(err.to_string(), "json: Bad JSON data");
    }

    #[test]
    fn test_source_data_is_bounded() {
        let big = "x".repeat(SOURCE_DATA_LIMIT * 2);
        let err = ParserError::new("json", "Bad JSON data").with_source_data(&big);
        assert_eq!(err.source_data().unwrap().len(), SOURCE_DATA_LIMIT);
    }

    #[test]
    fn test_parser_error_preserves_source() {
        let inner = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ParserError::new("string_to_json", "Bad JSON data").with_source(inner);

        let source = err.source().expect("parser error should have a source");
        assert!(source.downcast_ref::<serde_json::Error>().is_some());
    }

    #[test]
    fn test_transport_error_chain_traversal() {
        let err = HttpError::Transport {
            request: info(),
            source: TransportError::Io(Box::new(std::io::Error::other("reset"))),
        };

        let mut count = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            count += 1;
            current = e.source();
        }

        assert_eq!(count, 3, "HttpError -> TransportError -> io::Error");
    }
}
