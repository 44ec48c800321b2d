//! Cookie persistence between requests.

use crate::error::BoxError;
use cookie::Cookie;
use http::HeaderMap;
use http::header::SET_COOKIE;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CookieError {
    /// A `Set-Cookie` header could not be understood
    #[error("Malformed Set-Cookie header: {0}")]
    Malformed(String),

    /// The backing store failed
    #[error("Cookie storage failed: {0}")]
    Storage(#[source] BoxError),
}

/// Supplies cookies for outgoing requests and records those a response sets.
///
/// Storage failures never fail a request; the client logs and ignores them.
pub trait CookieStore: Send + Sync {
    /// Value for the `Cookie` header of a request to `url`, if any.
    fn cookie_header(&self, url: &Url) -> Option<String>;

    /// Record the `Set-Cookie` headers of a response from `url`.
    ///
    /// # Errors
    /// Returns a `CookieError` if a header is malformed or cannot be stored.
    fn store_response_cookies(&self, url: &Url, headers: &HeaderMap) -> Result<(), CookieError>;
}

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    host_only: bool,
    secure: bool,
    /// Unix seconds
    expires_at: Option<i64>,
}

/// (domain, path, name)
type CookieKey = (String, String, String);

/// In-memory cookie jar following the RFC 6265 matching rules.
///
/// `Domain`, `Path`, `Secure`, `Max-Age` and `Expires` are honored: a
/// `Secure` cookie is only sent over `https`, and a cookie whose lifetime
/// ran out is dropped. A `Domain` attribute the response host does not
/// belong to makes the cookie be ignored.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    jar: Mutex<BTreeMap<CookieKey, StoredCookie>>,
}

impl MemoryCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live cookies that would be sent to some URL on `host`.
    #[must_use]
    pub fn len_for(&self, host: &str) -> usize {
        let now = unix_now();
        self.jar
            .lock()
            .iter()
            .filter(|((domain, _, _), c)| domain_matches(host, domain, c.host_only))
            .filter(|(_, c)| !c.is_expired(now))
            .count()
    }

    pub fn clear(&self) {
        self.jar.lock().clear();
    }
}

impl StoredCookie {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn domain_matches(host: &str, domain: &str, host_only: bool) -> bool {
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }
    !host_only
        && host.parse::<std::net::IpAddr>().is_err()
        && host.len() > domain.len()
        && host.to_ascii_lowercase().ends_with(&format!(".{domain}"))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

/// Directory of the request path, used when `Path` is absent or invalid.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => path[..idx].to_owned(),
    }
}

impl CookieStore for MemoryCookieStore {
    fn cookie_header(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let secure_channel = url.scheme() == "https";
        let now = unix_now();

        let jar = self.jar.lock();
        let mut matching: Vec<(&CookieKey, &StoredCookie)> = jar
            .iter()
            .filter(|((domain, path, _), c)| {
                domain_matches(host, domain, c.host_only)
                    && path_matches(url.path(), path)
                    && (secure_channel || !c.secure)
                    && !c.is_expired(now)
            })
            .collect();
        if matching.is_empty() {
            return None;
        }
        // Longer paths first; the sort is stable so names stay ordered.
        matching.sort_by_key(|((_, path, _), _)| std::cmp::Reverse(path.len()));
        Some(
            matching
                .iter()
                .map(|((_, _, name), c)| format!("{name}={}", c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn store_response_cookies(&self, url: &Url, headers: &HeaderMap) -> Result<(), CookieError> {
        let Some(host) = url.host_str() else {
            return Ok(());
        };
        let host = host.to_ascii_lowercase();
        let now = unix_now();

        let mut parsed = Vec::new();
        for value in headers.get_all(SET_COOKIE) {
            let raw = value
                .to_str()
                .map_err(|_| CookieError::Malformed("non-ASCII Set-Cookie header".to_owned()))?;
            let cookie =
                Cookie::parse(raw).map_err(|e| CookieError::Malformed(e.to_string()))?;
            if cookie.name().is_empty() {
                return Err(CookieError::Malformed("empty cookie name".to_owned()));
            }

            let (domain, host_only) = match cookie.domain() {
                Some(domain) if !domain.is_empty() => {
                    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                    if !domain_matches(&host, &domain, false) {
                        tracing::debug!(
                            cookie = cookie.name(),
                            domain = %domain,
                            "ignoring cookie for foreign domain"
                        );
                        continue;
                    }
                    (domain, false)
                }
                _ => (host.clone(), true),
            };
            let path = match cookie.path() {
                Some(path) if path.starts_with('/') => path.to_owned(),
                _ => default_path(url),
            };
            let expires_at = match cookie.max_age() {
                Some(age) => Some(now.saturating_add(age.whole_seconds())),
                None => cookie
                    .expires_datetime()
                    .map(|at| at.unix_timestamp()),
            };

            parsed.push((
                (domain, path, cookie.name().to_owned()),
                StoredCookie {
                    value: cookie.value().trim_matches('"').to_owned(),
                    host_only,
                    secure: cookie.secure().unwrap_or(false),
                    expires_at,
                },
            ));
        }
        if parsed.is_empty() {
            return Ok(());
        }

        let mut jar = self.jar.lock();
        for (key, cookie) in parsed {
            if cookie.is_expired(now) {
                jar.remove(&key);
            } else {
                jar.insert(key, cookie);
            }
        }
        Ok(())
    }
}
