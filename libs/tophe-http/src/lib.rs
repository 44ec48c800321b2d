#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Builder-based HTTP requests with pluggable parsing and signing.
//!
//! A [`Request`] is assembled with [`RequestBuilder`]: URL, method, an
//! optional body ([`UrlEncodedBody`], [`JsonBody`], [`RawBody`]), a parser
//! that turns the response body into the caller's type, and an optional
//! [`RequestSigner`]. [`HttpClient::dispatch`] then sends it and returns the
//! parsed value or an [`HttpError`]:
//!
//! - [`ErrorKind::Configuration`]: the request could not be assembled
//! - [`ErrorKind::Transport`]: no HTTP status was obtained
//! - [`ErrorKind::Parser`]: a 2xx body could not be parsed
//! - [`ErrorKind::Server`]: any other status, with whatever diagnostics the
//!   error body yielded
//!
//! Parsers are chains of [`XferTransform`] stages. The client always runs
//! [`DecodeContent`] first, so gzip and deflate bodies reach the parser
//! decoded and size-limited.
//!
//! The network exchange sits behind the [`Transport`] trait. The default
//! [`HyperTransport`] uses a pooled hyper client over rustls with tower
//! middleware for the user agent and redirects.
//!
//! # Example
//!
//! ```ignore
//! use tophe_http::{HttpClient, Request, UrlEncodedBody, parsers};
//!
//! let client = HttpClient::builder()
//!     .user_agent("timeline/2.0")
//!     .build()?;
//!
//! let request = Request::builder()
//!     .url("https://api.example.com/statuses/update")?
//!     .body(UrlEncodedBody::new().with("status", "hello"))
//!     .parser(parsers::json_value())
//!     .build()?;
//!
//! let status = client.dispatch(request).await?;
//! ```

mod body;
mod builder;
mod classify;
mod client;
mod config;
mod cookies;
mod error;
mod headers;
mod layers;
pub mod parsers;
mod progress;
mod request;
mod response;
pub mod security;
mod signer;
mod transform;
mod transport;

pub use body::{FORM_CONTENT_TYPE, HttpBody, JSON_CONTENT_TYPE, JsonBody, RawBody, UrlEncodedBody};
pub use builder::HttpClientBuilder;
pub use classify::JsonErrorHandler;
pub use client::HttpClient;
pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, HttpClientConfig, RequestConfig, TlsRootConfig,
    method_allows_body,
};
pub use cookies::{CookieError, CookieStore, MemoryCookieStore};
pub use error::{
    BoxError, ConfigError, ErrorKind, HttpError, InvalidUriKind, ParserError, ServerError,
    SourceData,
};
pub use headers::{Header, HeaderStore};
pub use layers::{UserAgentLayer, UserAgentService};
pub use progress::{UploadProgress, UploadProgressListener};
pub use request::{Request, RequestBuilder, RequestInfo};
pub use response::parse_retry_after;
pub use signer::{NoopSigner, RequestSigner, SignableRequest};
pub use transform::{
    BodyToBytes, BodyToString, Chain, DecodeContent, DiscardBody, JsonToType, ParseContext,
    StringToJson, XferTransform, XferTransformExt,
};
pub use transport::{HyperTransport, Transport, TransportError, TransportRequest, TransportResponse};
