//! Ready-made response parsers.
//!
//! Content decoding is applied by the client before any of these run, so
//! they all start from the decoded body.

use crate::transform::{
    BodyToBytes, BodyToString, DiscardBody, JsonToType, StringToJson, XferTransform,
    XferTransformExt,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// Body as UTF-8 (or declared charset) text.
#[must_use]
pub fn string() -> impl XferTransform<Bytes, String> {
    BodyToString
}

/// Body as an untyped JSON document.
#[must_use]
pub fn json_value() -> impl XferTransform<Bytes, serde_json::Value> {
    BodyToString.then(StringToJson)
}

/// Body deserialized from JSON into `T`.
#[must_use]
pub fn json<T: DeserializeOwned + 'static>() -> impl XferTransform<Bytes, T> {
    BodyToString.then(StringToJson).then(JsonToType::<T>::new())
}

/// Raw body bytes.
#[must_use]
pub fn bytes() -> impl XferTransform<Bytes, Bytes> {
    BodyToBytes
}

/// Ignore the body; only the status matters.
#[must_use]
pub fn discard() -> impl XferTransform<Bytes, ()> {
    DiscardBody
}
