//! Turns a non-2xx response into a [`ServerError`].
//!
//! Extraction is best effort: whatever can be read from the error body is
//! attached, and any failure while reading it is logged and dropped so the
//! caller always gets the server error itself.

use crate::error::{ParserError, ServerError};
use crate::request::RequestInfo;
use crate::transform::{
    BodyToString, DecodeContent, ParseContext, StringToJson, XferTransform, XferTransformExt,
};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Application hook refining server errors that carry a JSON body.
///
/// Called after the message and structured payload were attached, so
/// implementations may override either.
pub trait JsonErrorHandler: Send + Sync {
    fn handle_json_error(&self, error: &mut ServerError, json: &serde_json::Value);
}

impl<F> JsonErrorHandler for F
where
    F: Fn(&mut ServerError, &serde_json::Value) + Send + Sync,
{
    fn handle_json_error(&self, error: &mut ServerError, json: &serde_json::Value) {
        self(error, json);
    }
}

enum BodyKind {
    Json,
    Text,
    Opaque,
}

fn body_kind(content_type: Option<&str>) -> BodyKind {
    let Some(raw) = content_type else {
        return BodyKind::Text;
    };
    let Ok(parsed) = raw.parse::<mime::Mime>() else {
        return BodyKind::Text;
    };
    if parsed.subtype() == mime::JSON || parsed.suffix() == Some(mime::JSON) {
        BodyKind::Json
    } else if parsed.type_() == mime::TEXT {
        BodyKind::Text
    } else {
        BodyKind::Opaque
    }
}

/// Build the error for a response with a non-success `status`.
pub fn server_error(
    request: RequestInfo,
    status: StatusCode,
    headers: HeaderMap,
    body: &Bytes,
    handler: Option<&dyn JsonErrorHandler>,
    decode_limit: usize,
) -> ServerError {
    let kind = body_kind(
        headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );
    let cx = ParseContext::new(request, status, headers);

    match kind {
        BodyKind::Json => {
            let parsed = DecodeContent::new(decode_limit)
                .then(BodyToString)
                .then(StringToJson)
                .transform(body, &cx);
            let (request, status, headers) = cx.into_parts();
            let mut error = ServerError::new(request, status, headers);
            match parsed {
                Ok(json) => {
                    error.set_message(json.to_string());
                    error.set_server_error(json.clone());
                    if let Some(handler) = handler {
                        handler.handle_json_error(&mut error, &json);
                    }
                }
                Err(e) => log_dropped(&error, &e),
            }
            error
        }
        BodyKind::Text => {
            let parsed = DecodeContent::new(decode_limit)
                .then(BodyToString)
                .transform(body, &cx);
            let (request, status, headers) = cx.into_parts();
            let mut error = ServerError::new(request, status, headers);
            match parsed {
                Ok(text) if !text.is_empty() => error.set_message(text),
                Ok(_) => {}
                Err(e) => log_dropped(&error, &e),
            }
            error
        }
        BodyKind::Opaque => {
            let (request, status, headers) = cx.into_parts();
            ServerError::new(request, status, headers)
        }
    }
}

fn log_dropped(error: &ServerError, cause: &ParserError) {
    tracing::debug!(
        request = %error.request(),
        status = error.status().as_u16(),
        stage = cause.stage(),
        error = %cause,
        "could not read server error body"
    );
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_BODY_SIZE;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn info() -> RequestInfo {
        RequestInfo::new(
            http::Method::GET,
            url::Url::parse("https://api.example.com/me").unwrap(),
        )
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    fn classify(
        status: StatusCode,
        pairs: &[(&str, &str)],
        body: &[u8],
        handler: Option<&dyn JsonErrorHandler>,
    ) -> ServerError {
        server_error(
            info(),
            status,
            headers(pairs),
            &Bytes::copy_from_slice(body),
            handler,
            DEFAULT_MAX_BODY_SIZE,
        )
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_json_error_body() {
        let err = classify(
            StatusCode::UNAUTHORIZED,
            &[("content-type", "application/json; charset=utf-8")],
            br#"{"error":"invalid_token"}"#,
            None,
        );

        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(!err.is_temporary_failure());
        assert_eq!(err.message(), Some(r#"{"error":"invalid_token"}"#));
        assert_eq!(
            err.server_error().unwrap()["error"],
            serde_json::json!("invalid_token")
        );
    }

    #[test]
    fn test_problem_json_suffix() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            &[("content-type", "application/problem+json")],
            br#"{"title":"bad"}"#,
            None,
        );
        assert!(err.server_error().is_some());
    }

    #[test]
    fn test_json_handler_refines_error() {
        let handler = |error: &mut ServerError, json: &serde_json::Value| {
            if let Some(msg) = json["errors"][0]["message"].as_str() {
                error.set_message(msg);
            }
        };
        let err = classify(
            StatusCode::FORBIDDEN,
            &[("content-type", "application/json")],
            br#"{"errors":[{"message":"Rate limit exceeded"}]}"#,
            Some(&handler),
        );
        assert_eq!(err.message(), Some("Rate limit exceeded"));
        assert!(err.server_error().is_some());
    }

    #[test]
    fn test_gzip_json_error_body() {
        let body = gzip(br#"{"error":"overloaded"}"#);
        let err = classify(
            StatusCode::SERVICE_UNAVAILABLE,
            &[
                ("content-type", "application/json"),
                ("content-encoding", "gzip"),
            ],
            &body,
            None,
        );
        assert!(err.is_temporary_failure());
        assert_eq!(err.message(), Some(r#"{"error":"overloaded"}"#));
    }

    #[test]
    fn test_corrupt_gzip_yields_bare_error() {
        let err = classify(
            StatusCode::BAD_GATEWAY,
            &[
                ("content-type", "application/json"),
                ("content-encoding", "gzip"),
            ],
            b"\x1f\x8b garbage",
            None,
        );
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.message().is_none());
        assert!(err.server_error().is_none());
    }

    #[test]
    fn test_invalid_json_yields_bare_error() {
        let err = classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            &[("content-type", "application/json")],
            b"<html>oops</html>",
            None,
        );
        assert!(err.message().is_none());
        assert!(err.server_error().is_none());
    }

    #[test]
    fn test_text_error_body() {
        let err = classify(
            StatusCode::NOT_FOUND,
            &[("content-type", "text/plain")],
            b"no such user",
            None,
        );
        assert_eq!(err.message(), Some("no such user"));
        assert!(err.server_error().is_none());
    }

    #[test]
    fn test_missing_content_type_treated_as_text() {
        let err = classify(StatusCode::CONFLICT, &[], b"conflict", None);
        assert_eq!(err.message(), Some("conflict"));
    }

    #[test]
    fn test_opaque_error_body_not_read() {
        let err = classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            &[("content-type", "application/octet-stream")],
            b"\x00\x01\x02",
            None,
        );
        assert!(err.message().is_none());
        assert!(err.server_error().is_none());
        assert_eq!(err.content_type(), Some("application/octet-stream"));
    }
}
