//! Two-tier request header store.
//!
//! A header name is either *set* (single value, last write wins) or *added*
//! (a set of distinct values). Setting a name discards its added values;
//! adding never touches the set value. Names are case-insensitive and stored
//! lowercased.

use crate::error::ConfigError;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A single header name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Request-specific headers, merged with client defaults at dispatch.
#[derive(Debug, Clone, Default)]
pub struct HeaderStore {
    set: HashMap<String, String>,
    add: HashMap<String, HashSet<String>>,
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl HeaderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any set or added values for the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let name = normalize(name);
        self.add.remove(&name);
        self.set.insert(name, value.into());
    }

    /// Remove every value recorded for `name`.
    pub fn remove_header(&mut self, name: &str) {
        let name = normalize(name);
        self.add.remove(&name);
        self.set.remove(&name);
    }

    /// Add a value for `name`. Duplicate values are stored once.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.add
            .entry(normalize(name))
            .or_default()
            .insert(value.into());
    }

    /// Value recorded for `name`.
    ///
    /// Returns the set value if any; otherwise one of the added values. Which
    /// added value is returned is unspecified when several exist.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = normalize(name);
        if let Some(value) = self.set.get(&name) {
            return Some(value);
        }
        self.add
            .get(&name)
            .and_then(|values| values.iter().next())
            .map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let name = normalize(name);
        self.set.contains_key(&name) || self.add.get(&name).is_some_and(|v| !v.is_empty())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add.values().all(HashSet::is_empty)
    }

    /// Enumerate `defaults`, then set headers, then added headers.
    ///
    /// No deduplication is applied: a name present in several sources is
    /// listed once per source.
    #[must_use]
    pub fn all_headers(&self, defaults: &[Header]) -> Vec<Header> {
        let mut all: Vec<Header> = defaults.to_vec();
        all.extend(
            self.set
                .iter()
                .map(|(name, value)| Header::new(name.clone(), value.clone())),
        );
        for (name, values) in &self.add {
            all.extend(values.iter().map(|v| Header::new(name.clone(), v.clone())));
        }
        all
    }

    /// Build the header map handed to the transport.
    ///
    /// Defaults are inserted first, set headers override them and added
    /// headers are appended.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidHeaderName` / `InvalidHeaderValue` if a
    /// name or value cannot be represented on the wire.
    pub fn merge_into(&self, defaults: &[Header]) -> Result<HeaderMap, ConfigError> {
        let mut map = HeaderMap::new();
        for header in defaults {
            let (name, value) = wire_pair(&header.name, &header.value)?;
            map.insert(name, value);
        }
        for (name, value) in &self.set {
            let (name, value) = wire_pair(name, value)?;
            map.insert(name, value);
        }
        for (name, values) in &self.add {
            for value in values {
                let (name, value) = wire_pair(name, value)?;
                map.append(name, value);
            }
        }
        Ok(map)
    }
}

fn wire_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let name = HeaderName::from_bytes(name.as_bytes())?;
    let value = HeaderValue::from_str(value)?;
    Ok((name, value))
}
