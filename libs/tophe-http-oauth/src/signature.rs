//! OAuth 1.0 signature base string and HMAC-SHA1 signature (RFC 5849 section 3.4).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use http::Method;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// Everything except the RFC 3986 unreserved characters.
const OAUTH_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode `value` the way OAuth requires (uppercase hex, RFC 3986).
#[must_use]
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_RESERVED).to_string()
}

/// Base string URI: scheme and host lowercased, default port and query dropped.
#[must_use]
pub fn base_uri(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default();
    let path = url.path();
    match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}{path}"),
        None => format!("{scheme}://{host}{path}"),
    }
}

/// Encode, sort and join request parameters.
#[must_use]
pub fn normalize_parameters(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(name, value)| (encode(name), encode(value)))
        .collect();
    encoded.sort_unstable();
    encoded
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signature base string.
///
/// `params` holds the query parameters, form body parameters and protocol
/// parameters (without `oauth_signature`).
#[must_use]
pub fn base_string(method: &Method, url: &Url, params: &[(String, String)]) -> String {
    format!(
        "{}&{}&{}",
        method.as_str().to_ascii_uppercase(),
        encode(&base_uri(url)),
        encode(&normalize_parameters(params))
    )
}

/// HMAC-SHA1 of `base_string` keyed with `consumer_secret&token_secret`, base64 encoded.
///
/// # Errors
/// Returns `InvalidLength` if the MAC rejects the key.
pub fn hmac_sha1(
    base_string: &str,
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, InvalidLength> {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
