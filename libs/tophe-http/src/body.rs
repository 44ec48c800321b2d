//! Request body encoders.

use crate::error::ConfigError;
use crate::headers::HeaderStore;
use crate::progress::UploadProgressListener;
use crate::request::RequestInfo;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::sync::OnceLock;

/// Content type of [`UrlEncodedBody`].
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Content type of [`JsonBody`].
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A request body that knows its own headers and wire encoding.
pub trait HttpBody: Send + Sync + fmt::Debug {
    /// Value of the `Content-Type` header for this body.
    fn content_type(&self) -> &str;

    /// Wire bytes of the body.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the body cannot be encoded.
    fn encoded(&self) -> Result<Bytes, ConfigError>;

    /// Form parameters carried by the body, exposed to request signers.
    fn form_params(&self) -> Option<&[(String, String)]> {
        None
    }

    /// Exact encoded length in bytes.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the body cannot be encoded.
    fn content_length(&self) -> Result<usize, ConfigError> {
        self.encoded().map(|b| b.len())
    }

    /// Write `Content-Type` and `Content-Length` into the request headers.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the body cannot be encoded.
    fn settle_headers(&self, headers: &mut HeaderStore) -> Result<(), ConfigError> {
        headers.set_header("content-type", self.content_type());
        headers.set_header("content-length", self.content_length()?.to_string());
        Ok(())
    }

    /// Write the encoded body to `out`, reporting progress at 0 and 100 percent.
    ///
    /// # Errors
    /// Returns an I/O error if writing fails or the body cannot be encoded.
    fn write_body_to(
        &self,
        out: &mut dyn Write,
        request: &RequestInfo,
        progress: Option<&dyn UploadProgressListener>,
    ) -> io::Result<()> {
        let bytes = self.encoded().map_err(io::Error::other)?;
        if let Some(listener) = progress {
            listener.on_upload_progress(request, 0);
        }
        out.write_all(&bytes)?;
        if let Some(listener) = progress {
            listener.on_upload_progress(request, 100);
        }
        Ok(())
    }
}

/// `application/x-www-form-urlencoded` body.
///
/// Parameters are kept in insertion order. The encoding is computed on first
/// use and cached; from then on the body is frozen and further [`add`]
/// calls are ignored.
///
/// [`add`]: UrlEncodedBody::add
#[derive(Default)]
pub struct UrlEncodedBody {
    params: Vec<(String, String)>,
    encoded: OnceLock<Bytes>,
}

impl UrlEncodedBody {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter. Strings, booleans and integers all go through
    /// their `Display` form.
    pub fn add(&mut self, name: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        let name = name.into();
        if self.is_frozen() {
            tracing::warn!(param = %name, "form body already encoded, parameter ignored");
            return self;
        }
        self.params.push((name, value.to_string()));
        self
    }

    /// Builder-style variant of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.add(name, value);
        self
    }

    /// Whether the encoding was already computed.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.encoded.get().is_some()
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn encode(&self) -> Result<Bytes, ConfigError> {
        if let Some(bytes) = self.encoded.get() {
            return Ok(bytes.clone());
        }
        let encoded = serde_urlencoded::to_string(&self.params)?.replace('*', "%2A");
        Ok(self.encoded.get_or_init(|| Bytes::from(encoded)).clone())
    }
}

impl<K, V> FromIterator<(K, V)> for UrlEncodedBody
where
    K: Into<String>,
    V: fmt::Display,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut body = Self::new();
        for (name, value) in iter {
            body.add(name, value);
        }
        body
    }
}

impl fmt::Debug for UrlEncodedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlEncodedBody")
            .field("params", &self.params.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl HttpBody for UrlEncodedBody {
    fn content_type(&self) -> &str {
        FORM_CONTENT_TYPE
    }

    fn encoded(&self) -> Result<Bytes, ConfigError> {
        self.encode()
    }

    fn form_params(&self) -> Option<&[(String, String)]> {
        Some(&self.params)
    }
}

/// JSON body, serialized once at construction.
#[derive(Debug, Clone)]
pub struct JsonBody {
    bytes: Bytes,
}

impl JsonBody {
    /// # Errors
    /// Returns `ConfigError::JsonEncode` if `value` cannot be serialized.
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self, ConfigError> {
        Ok(Self {
            bytes: Bytes::from(serde_json::to_vec(value)?),
        })
    }
}

impl HttpBody for JsonBody {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn encoded(&self) -> Result<Bytes, ConfigError> {
        Ok(self.bytes.clone())
    }
}

/// Opaque bytes with an explicit content type.
#[derive(Debug, Clone)]
pub struct RawBody {
    content_type: String,
    bytes: Bytes,
}

impl RawBody {
    #[must_use]
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

impl HttpBody for RawBody {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn encoded(&self) -> Result<Bytes, ConfigError> {
        Ok(self.bytes.clone())
    }
}
