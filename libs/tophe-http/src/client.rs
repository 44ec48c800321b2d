use crate::builder::HttpClientBuilder;
use crate::classify;
use crate::config::HttpClientConfig;
use crate::cookies::CookieStore;
use crate::error::{ConfigError, HttpError};
use crate::request::{Request, RequestInfo};
use crate::security::ERROR_BODY_DECODE_LIMIT;
use crate::transform::{DecodeContent, ParseContext, XferTransform, XferTransformExt};
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use std::sync::Arc;
use tracing::Instrument;

/// Dispatches [`Request`]s over a [`Transport`].
///
/// One dispatch runs these steps in order:
///
/// 1. fail with `ConfigError::MissingParser` if the request has no parser
/// 2. settle body headers (`Content-Type`, `Content-Length`)
/// 3. run the request signer exactly once
/// 4. attach cookies from the cookie store
/// 5. merge client default headers with the request headers
/// 6. encode the body
/// 7. execute the exchange on the transport, which reports upload progress
/// 8. persist response cookies, ignoring store failures
/// 9. parse a 2xx body through `DecodeContent` and the request parser, or
///    classify any other status into a [`ServerError`](crate::ServerError)
///
/// Nothing is retried; [`HttpError::is_temporary_failure`] tells the caller
/// whether trying again may help.
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`. Clones share the transport and its
/// connection pool, so distinct requests may be dispatched concurrently.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder()
///     .user_agent("timeline/2.0")
///     .build()?;
///
/// let request = Request::builder()
///     .url("https://api.example.com/statuses/home")?
///     .parser(parsers::json::<Vec<Status>>())
///     .build()?;
///
/// let statuses = client.dispatch(request).await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    cookie_store: Option<Arc<dyn CookieStore>>,
    config: Arc<HttpClientConfig>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Create a client on an existing transport
    ///
    /// Transport settings in `config` (TLS, pool, user agent) are ignored;
    /// timeouts, redirects, body limits and default headers still apply.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, config: HttpClientConfig) -> Self {
        Self::from_parts(transport, None, config)
    }

    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        cookie_store: Option<Arc<dyn CookieStore>>,
        config: HttpClientConfig,
    ) -> Self {
        Self {
            transport,
            cookie_store,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Send `request` and parse the response into `T`.
    ///
    /// # Errors
    /// - `HttpError::Config` if the request has no parser, the signer fails
    ///   or a header cannot be put on the wire
    /// - `HttpError::Transport` if no HTTP status was obtained
    /// - `HttpError::Server` for any non-2xx status
    /// - `HttpError::Parser` if a 2xx body could not be parsed
    pub async fn dispatch<T>(&self, request: Request<T>) -> Result<T, HttpError> {
        let span = tracing::debug_span!(
            "http_dispatch",
            method = %request.method(),
            url = %request.url(),
            tag = request.log_tag(),
        );
        self.run(request).instrument(span).await
    }

    async fn run<T>(&self, mut request: Request<T>) -> Result<T, HttpError> {
        let Some(parser) = request.parser().cloned() else {
            return Err(HttpError::config(request.info(), ConfigError::MissingParser));
        };

        if let Err(e) = request.settle_headers() {
            return Err(HttpError::config(request.info(), e));
        }

        if let Some(store) = &self.cookie_store
            && !request.headers().contains("cookie")
            && let Some(cookies) = store.cookie_header(request.url())
        {
            request.set_header("cookie", cookies);
        }

        let info = request.info();
        let headers = request
            .headers()
            .merge_into(&self.config.default_headers)
            .map_err(|e| HttpError::config(info.clone(), e))?;
        let body = request
            .output_body(&info)
            .map_err(|e| transport_error(&info, TransportError::Io(Box::new(e))))?;
        let (timeout, follow_redirects) = request.config().resolve(&self.config);

        tracing::debug!(
            body_len = body.len(),
            timeout_secs = timeout.as_secs_f64(),
            "sending request"
        );
        let response = self
            .transport
            .execute(TransportRequest {
                method: request.method().clone(),
                url: request.url().clone(),
                headers,
                body,
                timeout,
                follow_redirects,
                progress: request.upload_progress(&info),
            })
            .await
            .map_err(|e| transport_error(&info, e))?;

        self.store_cookies(&request, &response);

        let TransportResponse {
            status,
            headers,
            body,
        } = response;
        tracing::debug!(status = status.as_u16(), body_len = body.len(), "response received");

        if !status.is_success() {
            let err = classify::server_error(
                info,
                status,
                headers,
                &body,
                request.error_handler(),
                ERROR_BODY_DECODE_LIMIT.min(self.config.max_body_size),
            );
            tracing::debug!(error = %err, "server error");
            return Err(err.into());
        }

        let cx = ParseContext::new(info, status, headers);
        let parsed = DecodeContent::new(self.config.max_body_size)
            .then(parser)
            .transform(&body, &cx);
        match parsed {
            Ok(value) => Ok(value),
            Err(e) => {
                let (request, status, _) = cx.into_parts();
                tracing::debug!(stage = e.stage(), error = %e, "response body not parsed");
                Err(HttpError::Parser {
                    request,
                    status,
                    source: e.or_source_data(&body).with_raw_data(&body),
                })
            }
        }
    }

    fn store_cookies<T>(&self, request: &Request<T>, response: &TransportResponse) {
        let Some(store) = &self.cookie_store else {
            return;
        };
        if let Err(e) = store.store_response_cookies(request.url(), &response.headers) {
            tracing::debug!(error = %e, "ignoring cookie store failure");
        }
    }
}

fn transport_error(info: &RequestInfo, source: TransportError) -> HttpError {
    tracing::debug!(error = %source, temporary = source.is_temporary(), "transport failed");
    HttpError::Transport {
        request: info.clone(),
        source,
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_cookie_store", &self.cookie_store.is_some())
            .finish_non_exhaustive()
    }
}
