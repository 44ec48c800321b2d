use super::upload_body::UploadBody;
use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::config::{HttpClientConfig, TlsRootConfig};
use crate::error::ConfigError;
use crate::layers::{UserAgentLayer, UserAgentService};
use crate::response::read_body_limited;
use async_trait::async_trait;
use http::header::{ACCEPT_ENCODING, HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::crypto::CryptoProvider;
use std::error::Error as StdError;
use std::sync::Arc;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::follow_redirect::policy::Limited;
use tower_http::follow_redirect::{FollowRedirect, FollowRedirectLayer};

type HttpsClient = Client<HttpsConnector<HttpConnector>, UploadBody>;

/// Codings `DecodeContent` knows how to undo.
const ACCEPTED_ENCODINGS: &str = "gzip, deflate";

/// Default [`Transport`]: pooled hyper client over rustls.
///
/// Two service stacks share one connection pool; which one a request uses
/// depends on whether it follows redirects.
///
/// ```text
/// UserAgent -> FollowRedirect(Limited) -> hyper client   (follow_redirects)
/// UserAgent -> hyper client                              (otherwise)
/// ```
///
/// Response bodies are collected under `max_body_size` and returned still
/// content-encoded.
#[derive(Clone)]
pub struct HyperTransport {
    direct: UserAgentService<HttpsClient>,
    redirecting: UserAgentService<FollowRedirect<HttpsClient, Limited>>,
    max_body_size: usize,
}

impl HyperTransport {
    /// Build the transport from the client configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Tls` if the TLS roots cannot be loaded and
    /// `ConfigError::InvalidHeaderValue` if the user agent is invalid.
    pub fn new(config: &HttpClientConfig) -> Result<Self, ConfigError> {
        let https = build_https_connector(config.tls_roots)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let client: HttpsClient = client_builder.build(https);

        let ua_layer = UserAgentLayer::try_new(&config.user_agent)?;

        let direct = ServiceBuilder::new()
            .layer(ua_layer.clone())
            .service(client.clone());
        let redirecting = ServiceBuilder::new()
            .layer(ua_layer)
            .layer(FollowRedirectLayer::with_policy(Limited::new(
                config.max_redirects,
            )))
            .service(client);

        Ok(Self {
            direct,
            redirecting,
            max_body_size: config.max_body_size,
        })
    }

    async fn exchange(
        &self,
        request: http::Request<UploadBody>,
        follow_redirects: bool,
    ) -> Result<TransportResponse, TransportError> {
        let response = if follow_redirects {
            self.redirecting.clone().oneshot(request).await
        } else {
            self.direct.clone().oneshot(request).await
        }
        .map_err(map_client_error)?;

        let (parts, body) = response.into_parts();
        let body = read_body_limited(&parts.headers, body, self.max_body_size).await?;

        Ok(TransportResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            mut headers,
            body,
            timeout,
            follow_redirects,
            progress,
        } = request;

        if !headers.contains_key(ACCEPT_ENCODING) {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPTED_ENCODINGS));
        }

        let mut http_request = http::Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(UploadBody::new(body, progress))?;
        *http_request.headers_mut() = headers;

        tokio::time::timeout(timeout, self.exchange(http_request, follow_redirects))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }
}

/// Classify a hyper-util client error by walking its source chain.
fn map_client_error(err: hyper_util::client::legacy::Error) -> TransportError {
    let mut source = err.source();
    while let Some(cause) = source {
        if is_tls_failure(cause) {
            return TransportError::Tls(Box::new(err));
        }
        source = cause.source();
    }
    if err.is_connect() {
        TransportError::Connect(Box::new(err))
    } else {
        TransportError::Io(Box::new(err))
    }
}

// hyper-rustls reports handshake failures as io::Error wrapping rustls::Error,
// and io::Error::source skips the wrapped error.
fn is_tls_failure(cause: &(dyn StdError + 'static)) -> bool {
    cause.is::<rustls::Error>()
        || cause
            .downcast_ref::<std::io::Error>()
            .and_then(std::io::Error::get_ref)
            .is_some_and(|inner| inner.is::<rustls::Error>())
}

/// Build the HTTPS connector with the specified TLS root configuration.
///
/// Plain `http://` URLs are allowed. HTTP/2 is negotiated through ALPN.
fn build_https_connector(
    tls_roots: TlsRootConfig,
) -> Result<HttpsConnector<HttpConnector>, ConfigError> {
    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| ConfigError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(native_tls_config()?)
        }
    };
    Ok(builder.https_or_http().enable_all_versions().build())
}

// Never installs a process-wide provider.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// rustls configuration trusting the OS certificate store.
///
/// An empty or unreadable store fails here, when the client is built.
fn native_tls_config() -> Result<rustls::ClientConfig, ConfigError> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    tracing::debug!(added, ignored, "native root certificates loaded");
    if added == 0 {
        return Err(ConfigError::Tls(
            "no usable root CA certificate in OS certificate store".into(),
        ));
    }

    let builder = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(Box::new(e)))?;
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::{HyperTransport, Transport, TransportError, TransportRequest};
    use crate::config::HttpClientConfig;
    use crate::progress::UploadProgress;
    use crate::request::RequestInfo;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use bytes::Bytes;
    use http::HeaderMap;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn transport() -> HyperTransport {
        HyperTransport::new(&HttpClientConfig::for_testing()).unwrap()
    }

    fn request(url: &str) -> TransportRequest {
        TransportRequest {
            method: http::Method::GET,
            url: url::Url::parse(url).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: Duration::from_secs(5),
            follow_redirects: true,
            progress: None,
        }
    }

    #[tokio::test]
    async fn test_execute_returns_raw_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/raw")
                .header("accept-encoding", "gzip, deflate")
                .header_exists("user-agent");
            then.status(201).header("x-echo", "1").body("created");
        });

        let response = transport()
            .execute(request(&server.url("/raw")))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.status, http::StatusCode::CREATED);
        assert_eq!(response.headers.get("x-echo").unwrap(), "1");
        assert_eq!(response.body.as_ref(), b"created");
    }

    #[tokio::test]
    async fn test_follow_redirects_toggle() {
        let server = MockServer::start();
        let _redirect = server.mock(|when, then| {
            when.method(GET).path("/old");
            then.status(302).header("location", "/new");
        });
        let _target = server.mock(|when, then| {
            when.method(GET).path("/new");
            then.status(200).body("moved");
        });

        let transport = transport();

        let followed = transport
            .execute(request(&server.url("/old")))
            .await
            .unwrap();
        assert_eq!(followed.status, http::StatusCode::OK);
        assert_eq!(followed.body.as_ref(), b"moved");

        let mut manual = request(&server.url("/old"));
        manual.follow_redirects = false;
        let not_followed = transport.execute(manual).await.unwrap();
        assert_eq!(not_followed.status, http::StatusCode::FOUND);
        assert_eq!(not_followed.headers.get("location").unwrap(), "/new");
    }

    #[tokio::test]
    async fn test_body_size_limit() {
        let server = MockServer::start();
        let large_body = "x".repeat(64 * 1024);
        let _m = server.mock(|when, then| {
            when.method(GET).path("/large");
            then.status(200).body(&large_body);
        });

        let mut config = HttpClientConfig::for_testing();
        config.max_body_size = 1024;
        let transport = HyperTransport::new(&config).unwrap();

        let err = transport
            .execute(request(&server.url("/large")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::BodyTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let mut req = request(&server.url("/slow"));
        req.timeout = Duration::from_millis(50);
        let err = transport().execute(req).await.unwrap_err();

        assert!(matches!(err, TransportError::Timeout(_)));
        assert!(err.is_temporary());
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = transport()
            .execute(request(&format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
        assert!(err.is_temporary());
    }

    #[test]
    fn test_native_roots_fail_at_build_time_only() {
        let mut config = HttpClientConfig::for_testing();
        config.tls_roots = crate::config::TlsRootConfig::Native;
        // Minimal containers may have no OS certificates; both outcomes are valid.
        match HyperTransport::new(&config) {
            Ok(_) => {}
            Err(err) => assert!(matches!(err, crate::error::ConfigError::Tls(_))),
        }
    }

    fn recording_progress(url: &str) -> (UploadProgress, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let seen = seen.clone();
            move |_: &RequestInfo, pct: u8| seen.lock().push(pct)
        };
        let info = RequestInfo::new(http::Method::POST, url::Url::parse(url).unwrap());
        (UploadProgress::new(info, Arc::new(listener)), seen)
    }

    fn upload(url: &str, progress: UploadProgress) -> TransportRequest {
        let mut req = request(url);
        req.method = http::Method::POST;
        req.headers
            .insert("content-type", "text/plain".parse().unwrap());
        req.body = Bytes::from_static(b"payload");
        req.progress = Some(progress);
        req
    }

    #[tokio::test]
    async fn test_upload_progress_reported_while_sending() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/upload").body("payload");
            then.status(204);
        });
        let url = server.url("/upload");
        let (progress, seen) = recording_progress(&url);

        let response = transport().execute(upload(&url, progress)).await.unwrap();

        mock.assert();
        assert_eq!(response.status, http::StatusCode::NO_CONTENT);
        assert_eq!(*seen.lock(), vec![0, 100]);
    }

    #[tokio::test]
    async fn test_no_upload_progress_when_connect_fails() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{port}/upload");
        let (progress, seen) = recording_progress(&url);

        let err = transport().execute(upload(&url, progress)).await.unwrap_err();

        assert!(matches!(err, TransportError::Connect(_)));
        assert!(seen.lock().is_empty());
    }
}
