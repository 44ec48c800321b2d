use crate::headers::Header;
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("tophe-http/", env!("CARGO_PKG_VERSION"));

/// Default cap on response body size, before and after content decoding (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Whether requests with `method` may carry a body.
///
/// GET and HEAD never do; every other method may.
#[must_use]
pub fn method_allows_body(method: &http::Method) -> bool {
    !matches!(*method, http::Method::GET | http::Method::HEAD)
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout (default: 30 seconds)
    ///
    /// Covers connecting, sending, and collecting the whole response body.
    /// Can be overridden per request with [`RequestConfig::timeout`].
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 10 MB)
    ///
    /// Applies to the bytes received and again to the decoded body.
    pub max_body_size: usize,

    /// User-Agent header value (default: "tophe-http/<version>")
    pub user_agent: String,

    /// Follow 3xx redirects (default: true)
    pub follow_redirects: bool,

    /// Maximum number of redirects followed for one request (default: 10)
    pub max_redirects: usize,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    ///
    /// Setting this to `0` disables connection reuse entirely.
    pub pool_max_idle_per_host: usize,

    /// Headers sent with every request unless the request overrides them
    pub default_headers: Vec<Header>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            follow_redirects: true,
            max_redirects: 10,
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            default_headers: Vec::new(),
        }
    }
}

impl HttpClientConfig {
    /// Create minimal configuration (small timeout, small pool, no redirects)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            follow_redirects: false,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Self::default()
        }
    }

    /// Create configuration for tests against local mock servers
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}

/// Per-request overrides of [`HttpClientConfig`].
///
/// `None` fields fall back to the client configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestConfig {
    pub timeout: Option<Duration>,
    pub follow_redirects: Option<bool>,
}

impl RequestConfig {
    /// Resolve overrides against the client configuration.
    #[must_use]
    pub fn resolve(&self, client: &HttpClientConfig) -> (Duration, bool) {
        (
            self.timeout.unwrap_or(client.request_timeout),
            self.follow_redirects.unwrap_or(client.follow_redirects),
        )
    }
}
