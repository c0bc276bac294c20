//! Structured `prefix:id[:prefix:id...]` keys.

use std::fmt;

use hmap_common::{MapperError, MapperResult};

const SEPARATOR: char = ':';

fn check_part(value: &str, what: &str) -> MapperResult<()> {
    if value.is_empty() {
        return Err(MapperError::invalid_argument(format!("key {what} must not be empty")));
    }
    if value.contains(SEPARATOR) {
        return Err(MapperError::invalid_argument(format!(
            "key {what} '{value}' must not contain '{SEPARATOR}'"
        )));
    }
    Ok(())
}

/// A store key made of `prefix:id` pairs.
///
/// Keys without a separator are a single part with no id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> MapperResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(MapperError::invalid_argument("key must not be empty"));
        }
        Ok(CacheKey(key))
    }

    /// Builds `prefix:id`.
    pub fn with_prefix(prefix: &str, id: impl fmt::Display) -> MapperResult<Self> {
        let id = id.to_string();
        check_part(prefix, "prefix")?;
        check_part(&id, "id")?;
        Ok(CacheKey(format!("{prefix}{SEPARATOR}{id}")))
    }

    /// Appends another `prefix:id` pair.
    pub fn append(mut self, prefix: &str, id: impl fmt::Display) -> MapperResult<Self> {
        let id = id.to_string();
        check_part(prefix, "prefix")?;
        check_part(&id, "id")?;
        self.0.push(SEPARATOR);
        self.0.push_str(prefix);
        self.0.push(SEPARATOR);
        self.0.push_str(&id);
        Ok(self)
    }

    /// Ordered `(prefix, id)` pairs. A trailing prefix without id has `None`.
    pub fn parts(&self) -> Vec<(&str, Option<&str>)> {
        let mut segments = self.0.split(SEPARATOR);
        let mut parts = Vec::new();
        while let Some(prefix) = segments.next() {
            parts.push((prefix, segments.next()));
        }
        parts
    }

    /// Id stored under `prefix`.
    pub fn part(&self, prefix: &str) -> Option<&str> {
        self.parts()
            .into_iter()
            .find(|(name, _)| *name == prefix)
            .and_then(|(_, id)| id)
    }

    /// Raw separator-delimited segment at `index`.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.0.split(SEPARATOR).nth(index)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey(key)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
