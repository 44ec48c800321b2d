//! Response body transforms.
//!
//! A parser is a pipeline of [`XferTransform`] stages composed with
//! [`XferTransformExt::then`]. Each stage is stateless, so a single parser
//! instance can be shared across requests.
//!
//! When a stage fails, the chain records a bounded copy of the data that
//! stage received (see [`SourceData`]) unless the stage already attached its
//! own.

use crate::config::DEFAULT_MAX_BODY_SIZE;
use crate::error::{ParserError, SourceData};
use crate::request::RequestInfo;
use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::io::Read;
use std::marker::PhantomData;
use std::sync::Arc;

/// Response metadata visible to every transform stage.
#[derive(Debug, Clone)]
pub struct ParseContext {
    request: RequestInfo,
    status: StatusCode,
    headers: HeaderMap,
}

impl ParseContext {
    #[must_use]
    pub fn new(request: RequestInfo, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            request,
            status,
            headers,
        }
    }

    #[must_use]
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Parsed `Content-Type`, `None` when absent or malformed.
    #[must_use]
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(http::header::CONTENT_TYPE)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    /// `Content-Encoding` codings in the order they were applied.
    #[must_use]
    pub fn content_encoding(&self) -> Vec<String> {
        self.headers
            .get_all(http::header::CONTENT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub(crate) fn into_parts(self) -> (RequestInfo, StatusCode, HeaderMap) {
        (self.request, self.status, self.headers)
    }
}

/// One step of a response parser, turning `I` into `O`.
pub trait XferTransform<I, O>: Send + Sync {
    /// # Errors
    /// Returns a `ParserError` describing why `input` could not be converted.
    fn transform(&self, input: &I, cx: &ParseContext) -> Result<O, ParserError>;

    /// Short stage name used in errors and logs.
    fn stage(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<I, O, T> XferTransform<I, O> for Arc<T>
where
    T: XferTransform<I, O> + ?Sized,
{
    fn transform(&self, input: &I, cx: &ParseContext) -> Result<O, ParserError> {
        (**self).transform(input, cx)
    }

    fn stage(&self) -> &'static str {
        (**self).stage()
    }
}

/// Two stages run back to back. Built with [`XferTransformExt::then`].
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _mid: PhantomData<fn() -> M>,
}

impl<I, M, O, A, B> XferTransform<I, O> for Chain<A, B, M>
where
    A: XferTransform<I, M>,
    B: XferTransform<M, O>,
    I: SourceData,
    M: SourceData,
{
    fn transform(&self, input: &I, cx: &ParseContext) -> Result<O, ParserError> {
        let mid = self
            .first
            .transform(input, cx)
            .map_err(|e| e.or_source_data(input))?;
        self.second
            .transform(&mid, cx)
            .map_err(|e| e.or_source_data(&mid))
    }

    fn stage(&self) -> &'static str {
        "chain"
    }
}

/// Composition helpers for [`XferTransform`].
pub trait XferTransformExt<I, M>: XferTransform<I, M> + Sized {
    /// Feed the output of `self` into `next`.
    fn then<B>(self, next: B) -> Chain<Self, B, M> {
        Chain {
            first: self,
            second: next,
            _mid: PhantomData,
        }
    }
}

impl<I, M, T: XferTransform<I, M>> XferTransformExt<I, M> for T {}

/// Undo `Content-Encoding` (gzip, x-gzip, deflate, identity).
///
/// The decoded size is capped at `limit` bytes.
#[derive(Debug, Clone)]
pub struct DecodeContent {
    limit: usize,
}

impl DecodeContent {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    fn decode_with(&self, reader: impl Read, coding: &str) -> Result<Vec<u8>, ParserError> {
        let mut out = Vec::new();
        let cap = u64::try_from(self.limit).unwrap_or(u64::MAX).saturating_add(1);
        reader
            .take(cap)
            .read_to_end(&mut out)
            .map_err(|e| {
                ParserError::new(self.stage(), format!("corrupt {coding} stream")).with_source(e)
            })?;
        if out.len() > self.limit {
            return Err(ParserError::new(
                self.stage(),
                format!("decoded body exceeds {} bytes", self.limit),
            ));
        }
        Ok(out)
    }

    fn inflate(&self, data: &[u8]) -> Result<Vec<u8>, ParserError> {
        // "deflate" is zlib-wrapped per RFC 9110, but raw streams are common.
        match self.decode_with(ZlibDecoder::new(data), "deflate") {
            Ok(out) => Ok(out),
            Err(zlib_err) => self
                .decode_with(DeflateDecoder::new(data), "deflate")
                .map_err(|_| zlib_err),
        }
    }
}

impl Default for DecodeContent {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_SIZE)
    }
}

impl XferTransform<Bytes, Bytes> for DecodeContent {
    fn transform(&self, input: &Bytes, cx: &ParseContext) -> Result<Bytes, ParserError> {
        let mut body = input.clone();
        for coding in cx.content_encoding().iter().rev() {
            body = match coding.as_str() {
                "identity" | "none" => body,
                "gzip" | "x-gzip" => {
                    Bytes::from(self.decode_with(GzDecoder::new(&body[..]), "gzip")?)
                }
                "deflate" => Bytes::from(self.inflate(&body)?),
                other => {
                    return Err(ParserError::new(
                        self.stage(),
                        format!("unsupported content encoding '{other}'"),
                    ));
                }
            };
        }
        Ok(body)
    }

    fn stage(&self) -> &'static str {
        "decode_content"
    }
}

/// Decode the body as text using the `charset` of the response content type.
///
/// UTF-8 (the default) is decoded strictly. ISO-8859-1 and US-ASCII are
/// also supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyToString;

impl XferTransform<Bytes, String> for BodyToString {
    fn transform(&self, input: &Bytes, cx: &ParseContext) -> Result<String, ParserError> {
        let charset = cx
            .content_type()
            .and_then(|m| m.get_param(mime::CHARSET).map(|c| c.as_str().to_ascii_lowercase()));

        match charset.as_deref() {
            None | Some("utf-8" | "utf8") => String::from_utf8(input.to_vec()).map_err(|e| {
                ParserError::new(self.stage(), "Invalid UTF-8 data").with_source(e)
            }),
            Some("iso-8859-1" | "latin1" | "us-ascii") => {
                Ok(input.iter().map(|&b| char::from(b)).collect())
            }
            Some(other) => Err(ParserError::new(
                self.stage(),
                format!("unsupported charset '{other}'"),
            )),
        }
    }

    fn stage(&self) -> &'static str {
        "body_to_string"
    }
}

/// Parse text as a JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringToJson;

impl XferTransform<String, serde_json::Value> for StringToJson {
    fn transform(
        &self,
        input: &String,
        _cx: &ParseContext,
    ) -> Result<serde_json::Value, ParserError> {
        serde_json::from_str(input)
            .map_err(|e| ParserError::new(self.stage(), "Bad JSON data").with_source(e))
    }

    fn stage(&self) -> &'static str {
        "string_to_json"
    }
}

/// Deserialize a JSON document into `T`.
pub struct JsonToType<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> JsonToType<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for JsonToType<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonToType<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonToType")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned> XferTransform<serde_json::Value, T> for JsonToType<T> {
    fn transform(&self, input: &serde_json::Value, _cx: &ParseContext) -> Result<T, ParserError> {
        T::deserialize(input).map_err(|e| {
            ParserError::new(
                self.stage(),
                format!("JSON does not match {}", std::any::type_name::<T>()),
            )
            .with_source(e)
        })
    }

    fn stage(&self) -> &'static str {
        "json_to_type"
    }
}

/// Hand the body through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyToBytes;

impl XferTransform<Bytes, Bytes> for BodyToBytes {
    fn transform(&self, input: &Bytes, _cx: &ParseContext) -> Result<Bytes, ParserError> {
        Ok(input.clone())
    }

    fn stage(&self) -> &'static str {
        "body_to_bytes"
    }
}

/// Ignore the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardBody;

impl XferTransform<Bytes, ()> for DiscardBody {
    fn transform(&self, _input: &Bytes, _cx: &ParseContext) -> Result<(), ParserError> {
        Ok(())
    }

    fn stage(&self) -> &'static str {
        "discard_body"
    }
}
