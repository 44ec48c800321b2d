#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! OAuth 1.0a request signing for `tophe-http`.
//!
//! [`OAuth1Signer`] implements [`tophe_http::RequestSigner`] with HMAC-SHA1
//! signatures. Attach it to a request with `RequestBuilder::signer`; the
//! client runs it once per dispatch after the body headers are known.
//!
//! Token acquisition (request token and access token exchange) is not
//! covered. Credentials are supplied by the application.

pub mod signature;
mod signer;
mod types;

pub use signer::{OAuth1Signer, SignatureLocation};
pub use types::{OAuthClientApp, OAuthUser, SecretString};
