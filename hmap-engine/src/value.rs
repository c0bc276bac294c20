//! # Stored Values
//!
//! Values kept by the in-memory store. Only the two shapes the mapper
//! produces are modelled: plain text (counters) and field/value hashes.

use std::time::Instant;

use ahash::RandomState;
use hashbrown::HashMap;

use hmap_common::{StoreError, StoreResult};

/// Field map of a hash value.
pub type FieldMap = HashMap<String, String, RandomState>;

#[derive(Debug, Clone)]
pub enum Value {
    /// Plain text value, used for counters.
    Text(String),
    /// Field/value hash.
    Hash(FieldMap),
}

impl Value {
    /// Creates an empty hash value.
    pub fn empty_hash() -> Self {
        Value::Hash(FieldMap::with_hasher(RandomState::new()))
    }

    /// Borrows the field map, failing on a type clash.
    pub fn as_hash(&self) -> StoreResult<&FieldMap> {
        match self {
            Value::Hash(fields) => Ok(fields),
            Value::Text(_) => Err(wrong_type()),
        }
    }

    /// Mutably borrows the field map, failing on a type clash.
    pub fn as_hash_mut(&mut self) -> StoreResult<&mut FieldMap> {
        match self {
            Value::Hash(fields) => Ok(fields),
            Value::Text(_) => Err(wrong_type()),
        }
    }

    /// Returns true for hashes without fields.
    pub fn is_empty_hash(&self) -> bool {
        matches!(self, Value::Hash(fields) if fields.is_empty())
    }
}

/// A stored value with its optional deadline.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    pub(crate) expires_at: Option<Instant>,
}

impl Entry {
    pub(crate) fn new(value: Value) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    /// Returns true when the entry has expired at `now`.
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

pub(crate) fn wrong_type() -> StoreError {
    StoreError::Server {
        message: "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    }
}

/// Parses a stored integer the way INCRBY does.
pub(crate) fn parse_counter(text: &str) -> StoreResult<i64> {
    text.parse().map_err(|_| StoreError::Server {
        message: "ERR value is not an integer or out of range".to_string(),
    })
}
