use crate::body::HttpBody;
use crate::classify::JsonErrorHandler;
use crate::config::{RequestConfig, method_allows_body};
use crate::error::{ConfigError, InvalidUriKind};
use crate::headers::{Header, HeaderStore};
use crate::progress::{UploadProgress, UploadProgressListener};
use crate::signer::{RequestSigner, SignableRequest};
use crate::transform::XferTransform;
use bytes::Bytes;
use http::Method;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Snapshot identifying a request in errors, logs and callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    method: Method,
    url: Url,
    identity: Option<String>,
    tag: Option<String>,
}

impl RequestInfo {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            identity: None,
            tag: None,
        }
    }

    /// Identity the request is made for (as reported by its signer).
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Caller-supplied log tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(identity) = &self.identity {
            write!(f, " for {identity}")?;
        }
        if let Some(tag) = &self.tag {
            write!(f, " [{tag}]")?;
        }
        Ok(())
    }
}

/// An HTTP request whose response body is parsed into `T`.
///
/// Built with [`RequestBuilder`]. Method, URL, parser and signer are fixed at
/// build time; headers stay mutable until the request is handed to
/// [`HttpClient::dispatch`](crate::HttpClient::dispatch), which consumes it.
pub struct Request<T> {
    url: Url,
    method: Method,
    headers: HeaderStore,
    body: Option<Box<dyn HttpBody>>,
    parser: Option<Arc<dyn XferTransform<Bytes, T>>>,
    signer: Option<Arc<dyn RequestSigner>>,
    progress: Option<Arc<dyn UploadProgressListener>>,
    error_handler: Option<Arc<dyn JsonErrorHandler>>,
    config: RequestConfig,
    log_tag: Option<String>,
}

impl<T> Request<T> {
    #[must_use]
    pub fn builder() -> RequestBuilder<T> {
        RequestBuilder::new()
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn body(&self) -> Option<&dyn HttpBody> {
        self.body.as_deref()
    }

    #[must_use]
    pub fn signer(&self) -> Option<&Arc<dyn RequestSigner>> {
        self.signer.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    #[must_use]
    pub fn log_tag(&self) -> Option<&str> {
        self.log_tag.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    /// See [`HeaderStore::set_header`].
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.set_header(name, value);
    }

    /// See [`HeaderStore::add_header`].
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.add_header(name, value);
    }

    /// See [`HeaderStore::remove_header`].
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove_header(name);
    }

    /// See [`HeaderStore::header`].
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.header(name)
    }

    /// Client default headers followed by this request's own headers.
    #[must_use]
    pub fn all_headers(&self, defaults: &[Header]) -> Vec<Header> {
        self.headers.all_headers(defaults)
    }

    /// Snapshot used to identify this request in errors and callbacks.
    #[must_use]
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.method.clone(),
            url: self.url.clone(),
            identity: self.signer.as_ref().and_then(|s| s.identity()),
            tag: self.log_tag.clone(),
        }
    }

    pub(crate) fn parser(&self) -> Option<&Arc<dyn XferTransform<Bytes, T>>> {
        self.parser.as_ref()
    }

    pub(crate) fn error_handler(&self) -> Option<&dyn JsonErrorHandler> {
        self.error_handler.as_deref()
    }

    /// Apply body headers, then let the signer run once.
    pub(crate) fn settle_headers(&mut self) -> Result<(), ConfigError> {
        if let Some(body) = &self.body {
            body.settle_headers(&mut self.headers)?;
        }
        if let Some(signer) = &self.signer {
            let form_params = self.body.as_deref().and_then(HttpBody::form_params);
            let mut signable =
                SignableRequest::new(&self.method, &mut self.url, &mut self.headers, form_params);
            signer.sign(&mut signable)?;
        }
        Ok(())
    }

    /// Encode the body. Progress is reported later by the transport.
    pub(crate) fn output_body(&self, info: &RequestInfo) -> io::Result<Bytes> {
        let Some(body) = &self.body else {
            return Ok(Bytes::new());
        };
        let mut out = Vec::new();
        body.write_body_to(&mut out, info, None)?;
        Ok(Bytes::from(out))
    }

    /// Progress handle for the transport, when there is a body to report on.
    pub(crate) fn upload_progress(&self, info: &RequestInfo) -> Option<UploadProgress> {
        self.body.as_ref()?;
        self.progress
            .as_ref()
            .map(|listener| UploadProgress::new(info.clone(), listener.clone()))
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("has_parser", &self.parser.is_some())
            .field("signer", &self.signer)
            .field("config", &self.config)
            .field("log_tag", &self.log_tag)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.info().fmt(f)
    }
}

/// Fluent builder for [`Request`].
///
/// Starts as a `GET` with no URL. Configuration mistakes that can be
/// detected locally (bad URL, body on GET/HEAD) are returned immediately
/// from the step that causes them.
///
/// # Example
///
/// ```ignore
/// use tophe_http::{Request, UrlEncodedBody, parsers};
///
/// let request = Request::builder()
///     .url("https://api.example.com/statuses/update")?
///     .body(UrlEncodedBody::new().with("status", "hello"))
///     .parser(parsers::json_value())
///     .build()?;
/// ```
#[must_use = "RequestBuilder does nothing until .build() is called"]
pub struct RequestBuilder<T> {
    url: Option<Url>,
    method: Method,
    headers: HeaderStore,
    body: Option<Box<dyn HttpBody>>,
    parser: Option<Arc<dyn XferTransform<Bytes, T>>>,
    signer: Option<Arc<dyn RequestSigner>>,
    progress: Option<Arc<dyn UploadProgressListener>>,
    error_handler: Option<Arc<dyn JsonErrorHandler>>,
    config: RequestConfig,
    log_tag: Option<String>,
}

impl<T> Default for RequestBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestBuilder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: None,
            method: Method::GET,
            headers: HeaderStore::new(),
            body: None,
            parser: None,
            signer: None,
            progress: None,
            error_handler: None,
            config: RequestConfig::default(),
            log_tag: None,
        }
    }

    /// Set the request URL.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidUri` if the URL is malformed or relative,
    /// `ConfigError::InvalidScheme` if it is not `http` or `https`.
    pub fn url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Set the request URL and append `params` to its query string.
    ///
    /// # Errors
    /// Same as [`url`](Self::url).
    pub fn url_with_params<I, K, V>(mut self, base: &str, params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = parse_url(base)?;
        let mut params = params.into_iter().peekable();
        if params.peek().is_some() {
            url.query_pairs_mut().extend_pairs(params);
        }
        self.url = Some(url);
        Ok(self)
    }

    /// Set an already parsed URL.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidScheme` / `InvalidUri` if the URL is not
    /// an absolute `http` or `https` URL.
    pub fn uri(mut self, url: Url) -> Result<Self, ConfigError> {
        let raw = url.to_string();
        self.url = Some(validate_url(url, &raw)?);
        Ok(self)
    }

    /// Set the HTTP method.
    ///
    /// # Errors
    /// Returns `ConfigError::BodyNotAllowed` if a body is already set and
    /// `method` is GET or HEAD.
    pub fn method(mut self, method: Method) -> Result<Self, ConfigError> {
        if self.body.is_some() && !method_allows_body(&method) {
            return Err(ConfigError::BodyNotAllowed(method));
        }
        self.method = method;
        Ok(self)
    }

    /// Attach a body and switch the method to `POST`.
    #[must_use]
    pub fn body(mut self, body: impl HttpBody + 'static) -> Self {
        self.method = Method::POST;
        self.body = Some(Box::new(body));
        self
    }

    /// Attach a body sent with `method`.
    ///
    /// # Errors
    /// Returns `ConfigError::BodyNotAllowed` if `method` is GET or HEAD.
    pub fn body_with_method(
        mut self,
        method: Method,
        body: impl HttpBody + 'static,
    ) -> Result<Self, ConfigError> {
        if !method_allows_body(&method) {
            return Err(ConfigError::BodyNotAllowed(method));
        }
        self.method = method;
        self.body = Some(Box::new(body));
        Ok(self)
    }

    /// Parser turning the (decoded) response body into `T`.
    #[must_use]
    pub fn parser(mut self, parser: impl XferTransform<Bytes, T> + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Share an existing parser instance.
    #[must_use]
    pub fn shared_parser(mut self, parser: Arc<dyn XferTransform<Bytes, T>>) -> Self {
        self.parser = Some(parser);
        self
    }

    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn progress_listener(mut self, listener: Arc<dyn UploadProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    /// Hook refining server errors whose body is JSON.
    #[must_use]
    pub fn json_error_handler(mut self, handler: Arc<dyn JsonErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Pre-set a request header. See [`HeaderStore::set_header`].
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set_header(name, value);
        self
    }

    /// Override the client request timeout for this request.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Override the client redirect setting for this request.
    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = Some(follow);
        self
    }

    /// Tag recorded on every log line and error for this request.
    #[must_use]
    pub fn log_tag(mut self, tag: impl Into<String>) -> Self {
        self.log_tag = Some(tag.into());
        self
    }

    /// Finish the request.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingUrl` if no URL was set.
    pub fn build(self) -> Result<Request<T>, ConfigError> {
        let url = self.url.ok_or(ConfigError::MissingUrl)?;
        Ok(Request {
            url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            parser: self.parser,
            signer: self.signer,
            progress: self.progress,
            error_handler: self.error_handler,
            config: self.config,
            log_tag: self.log_tag,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| {
        let kind = match e {
            url::ParseError::RelativeUrlWithoutBase => InvalidUriKind::MissingScheme,
            url::ParseError::EmptyHost => InvalidUriKind::MissingAuthority,
            _ => InvalidUriKind::ParseError,
        };
        ConfigError::InvalidUri {
            url: raw.to_owned(),
            kind,
            reason: e.to_string(),
        }
    })?;
    validate_url(url, raw)
}

fn validate_url(url: Url, raw: &str) -> Result<Url, ConfigError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidScheme(url.scheme().to_owned()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }
    Ok(url)
}
