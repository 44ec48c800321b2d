//! Request signing hook.

use crate::error::ConfigError;
use crate::headers::HeaderStore;
use http::Method;
use std::fmt;
use url::Url;

/// Mutable view of a request handed to a [`RequestSigner`].
///
/// Signers may rewrite the URL (query-string signatures) and the request
/// headers. Body headers are already settled when the signer runs.
pub struct SignableRequest<'a> {
    method: &'a Method,
    url: &'a mut Url,
    headers: &'a mut HeaderStore,
    form_params: Option<&'a [(String, String)]>,
}

impl<'a> SignableRequest<'a> {
    #[must_use]
    pub fn new(
        method: &'a Method,
        url: &'a mut Url,
        headers: &'a mut HeaderStore,
        form_params: Option<&'a [(String, String)]>,
    ) -> Self {
        Self {
            method,
            url,
            headers,
            form_params,
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        self.url
    }

    pub fn url_mut(&mut self) -> &mut Url {
        self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderStore {
        self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderStore {
        self.headers
    }

    /// Parameters of an `application/x-www-form-urlencoded` body, if any.
    #[must_use]
    pub fn form_params(&self) -> Option<&[(String, String)]> {
        self.form_params
    }
}

/// Adds authentication data to an outgoing request.
///
/// Called exactly once per dispatch.
pub trait RequestSigner: Send + Sync + fmt::Debug {
    /// # Errors
    /// Returns `ConfigError::Signing` if the request cannot be signed.
    fn sign(&self, request: &mut SignableRequest<'_>) -> Result<(), ConfigError>;

    /// Identity the requests are made on behalf of, used in logs and errors.
    fn identity(&self) -> Option<String> {
        None
    }
}

/// Signer that leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl RequestSigner for NoopSigner {
    fn sign(&self, _request: &mut SignableRequest<'_>) -> Result<(), ConfigError> {
        Ok(())
    }
}
