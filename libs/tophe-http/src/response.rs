//! Helpers for reading transport responses.

use crate::error::BoxError;
use crate::transport::TransportError;
use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body::Body;
use http_body_util::BodyExt;
use std::time::{Duration, SystemTime};

/// Parse the `Retry-After` header.
///
/// Accepts delay-seconds (`"120"`) and HTTP-dates
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Negative values, dates in the past
/// and anything unparseable yield `None`.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}

/// Collect `body` into memory, failing once more than `limit` bytes arrive.
///
/// A `Content-Length` above the limit is rejected before reading anything.
pub async fn read_body_limited<B>(
    headers: &HeaderMap,
    body: B,
    limit: usize,
) -> Result<Bytes, TransportError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let declared = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(actual) = declared
        && actual > limit
    {
        return Err(TransportError::BodyTooLarge { limit, actual });
    }

    let mut collected = BytesMut::with_capacity(declared.unwrap_or(0));
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| TransportError::Io(e.into()))?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(TransportError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(collected.freeze())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn retry_after(value: &str) -> Option<Duration> {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, value.parse().unwrap());
        parse_retry_after(&headers)
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(retry_after("  60  "), Some(Duration::from_secs(60)));
        assert_eq!(retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_rejects_bad_values() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
        assert_eq!(retry_after("soon"), None);
        assert_eq!(retry_after("-5"), None);
        assert_eq!(retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_parse_retry_after_future_date() {
        let when = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(60));
        let delay = retry_after(&when).unwrap();
        assert!((58..=60).contains(&delay.as_secs()));
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let body = Full::new(Bytes::from_static(b"hello"));
        let bytes = read_body_limited(&HeaderMap::new(), body, 5).await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_read_body_over_limit() {
        let body = Full::new(Bytes::from_static(b"hello world"));
        let err = read_body_limited(&HeaderMap::new(), body, 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::BodyTooLarge {
                limit: 5,
                actual: 11
            }
        ));
    }

    #[tokio::test]
    async fn test_read_body_rejects_declared_length() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, "1000".parse().unwrap());
        let err = read_body_limited(&headers, Full::new(Bytes::new()), 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::BodyTooLarge {
                limit: 10,
                actual: 1000
            }
        ));
    }
}
