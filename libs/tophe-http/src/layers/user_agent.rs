use crate::error::ConfigError;
use http::header::{HeaderValue, USER_AGENT};
use http::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Sets `User-Agent` on requests that do not carry one.
#[derive(Debug, Clone)]
pub struct UserAgentLayer {
    value: HeaderValue,
}

impl UserAgentLayer {
    /// # Errors
    /// Returns `ConfigError::InvalidHeaderValue` if `user_agent` is not a
    /// valid header value.
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, ConfigError> {
        Ok(Self {
            value: HeaderValue::from_str(user_agent.as_ref())?,
        })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            value: self.value.clone(),
        }
    }
}

/// Service produced by [`UserAgentLayer`].
#[derive(Debug, Clone)]
pub struct UserAgentService<S> {
    inner: S,
    value: HeaderValue,
}

impl<S, B> Service<Request<B>> for UserAgentService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.headers_mut()
            .entry(USER_AGENT)
            .or_insert_with(|| self.value.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::{ServiceExt, service_fn};

    async fn sent_user_agent(layer: &UserAgentLayer, req: Request<()>) -> Option<HeaderValue> {
        let echo = service_fn(|req: Request<()>| async move {
            Ok::<_, Infallible>(req.headers().get(USER_AGENT).cloned())
        });
        layer.layer(echo).oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn test_user_agent_added() {
        let layer = UserAgentLayer::try_new("tophe-test/1.0").unwrap();
        let req = Request::get("http://example.com").body(()).unwrap();

        assert_eq!(
            sent_user_agent(&layer, req).await.unwrap(),
            "tophe-test/1.0"
        );
    }

    #[tokio::test]
    async fn test_user_agent_not_overwritten() {
        let layer = UserAgentLayer::try_new("tophe-test/1.0").unwrap();
        let req = Request::get("http://example.com")
            .header(USER_AGENT, "custom-agent/2.0")
            .body(())
            .unwrap();

        assert_eq!(
            sent_user_agent(&layer, req).await.unwrap(),
            "custom-agent/2.0"
        );
    }

    #[test]
    fn test_user_agent_layer_invalid_value() {
        assert!(matches!(
            UserAgentLayer::try_new("bad\x00agent"),
            Err(ConfigError::InvalidHeaderValue(_))
        ));
    }
}
