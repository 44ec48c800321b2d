use crate::client::HttpClient;
use crate::config::{HttpClientConfig, TlsRootConfig};
use crate::cookies::CookieStore;
use crate::error::HttpError;
use crate::headers::{Header, HeaderStore};
use crate::transport::{HyperTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing an [`HttpClient`].
///
/// Without an explicit [`transport`](Self::transport) the client runs on
/// [`HyperTransport`] built from the same configuration.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    cookie_store: Option<Arc<dyn CookieStore>>,
    transport: Option<Arc<dyn Transport>>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            cookie_store: None,
            transport: None,
        }
    }

    /// Set the per-request timeout
    ///
    /// Requests may override it with
    /// [`RequestBuilder::timeout`](crate::RequestBuilder::timeout).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Follow redirects by default
    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the maximum number of redirects to follow
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Set TLS root certificate configuration
    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Set the idle timeout for pooled connections
    ///
    /// `None` keeps hyper-util's default.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Add a header sent with every request
    ///
    /// Requests that set the same header replace this value.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        self.config.default_headers.retain(|h| h.name != name);
        self.config.default_headers.push(Header::new(name, value));
        self
    }

    /// Replay and persist cookies through `store`
    #[must_use]
    pub fn cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.cookie_store = Some(store);
        self
    }

    /// Use `transport` instead of the default hyper transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns `HttpError::Config` if the default transport cannot be
    /// created (TLS roots unavailable, invalid user agent) or a default
    /// header is invalid.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        // Reject invalid default headers up front
        HeaderStore::new().merge_into(&self.config.default_headers)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(&self.config)?),
        };

        Ok(HttpClient::from_parts(
            transport,
            self.cookie_store,
            self.config,
        ))
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("config", &self.config)
            .field("has_cookie_store", &self.cookie_store.is_some())
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}
