//! # Wire Scalars
//!
//! The minimal value shape exchanged with a hash store.
//!
//! ## Design Principles
//!
//! 1. **Absent Is Not Empty**: `Absent` means "do not store" on writes and
//!    "not found" on reads. It never collapses into `""` or `0`.
//! 2. **Booleans Are Integers**: `true`/`false` travel as `1`/`0`, matching
//!    what a Redis-compatible server stores.
//! 3. **Text Stays Text**: replies from a server arrive as bulk strings, so the
//!    numeric accessors accept textual numbers as well as typed ones.
//!
//! ## Variant Overview
//!
//! ```text
//! WireScalar
//!   ├── Absent               (nil bulk / elided value)
//!   ├── Integer(i64)         (ints, bools, enums, dates, durations)
//!   ├── Float(f64)
//!   ├── String(String)       (plain text)
//!   └── Structured(String)   (JSON text for collections and nested objects)
//! ```

use std::borrow::Cow;
use std::fmt;

/// A single value as it is written to or read from a hash field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WireScalar {
    /// No value: the field is missing or should not be stored.
    #[default]
    Absent,
    /// Integral value (also used for booleans, enums, dates and durations).
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Plain text.
    String(String),
    /// Opaque structured text (JSON).
    Structured(String),
}

impl WireScalar {
    /// Returns true when no value is present.
    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, WireScalar::Absent)
    }

    /// Returns true for `Absent` and for empty text.
    pub fn is_absent_or_empty(&self) -> bool {
        match self {
            WireScalar::Absent => true,
            WireScalar::String(text) | WireScalar::Structured(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Returns the integral value, parsing text replies when needed.
    ///
    /// Floats are never considered integral, even when they have no
    /// fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireScalar::Integer(value) => Some(*value),
            WireScalar::String(text) | WireScalar::Structured(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns true when `as_i64` would succeed.
    #[inline]
    pub fn is_integral(&self) -> bool {
        self.as_i64().is_some()
    }

    /// Returns the numeric value, parsing text replies when needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireScalar::Integer(value) => Some(*value as f64),
            WireScalar::Float(value) => Some(*value),
            WireScalar::String(text) | WireScalar::Structured(text) => parse_float(text.trim()),
            WireScalar::Absent => None,
        }
    }

    /// Returns the textual form, or `None` when absent.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            WireScalar::Absent => None,
            WireScalar::Integer(value) => Some(Cow::Owned(value.to_string())),
            WireScalar::Float(value) => Some(Cow::Owned(format_float(*value))),
            WireScalar::String(text) | WireScalar::Structured(text) => Some(Cow::Borrowed(text)),
        }
    }

    /// Encodes the scalar as a command argument.
    ///
    /// `Absent` encodes to an empty argument; callers are expected to turn
    /// absent values into deletes before reaching the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.as_text() {
            Some(text) => text.into_owned().into_bytes(),
            None => Vec::new(),
        }
    }

    /// Builds a scalar from a bulk reply. `None` maps to `Absent`.
    pub fn from_bulk(data: Option<Vec<u8>>) -> Self {
        match data {
            None => WireScalar::Absent,
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(text) => WireScalar::String(text),
                Err(err) => {
                    WireScalar::String(String::from_utf8_lossy(err.as_bytes()).into_owned())
                }
            },
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireScalar::Absent => "absent",
            WireScalar::Integer(_) => "integer",
            WireScalar::Float(_) => "float",
            WireScalar::String(_) => "string",
            WireScalar::Structured(_) => "structured",
        }
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok(),
    }
}

fn format_float(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        value.to_string()
    }
}

impl fmt::Display for WireScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("(nil)"),
        }
    }
}

impl From<i64> for WireScalar {
    fn from(value: i64) -> Self {
        WireScalar::Integer(value)
    }
}

impl From<i32> for WireScalar {
    fn from(value: i32) -> Self {
        WireScalar::Integer(i64::from(value))
    }
}

impl From<f64> for WireScalar {
    fn from(value: f64) -> Self {
        WireScalar::Float(value)
    }
}

impl From<bool> for WireScalar {
    fn from(value: bool) -> Self {
        WireScalar::Integer(i64::from(value))
    }
}

impl From<String> for WireScalar {
    fn from(value: String) -> Self {
        WireScalar::String(value)
    }
}

impl From<&str> for WireScalar {
    fn from(value: &str) -> Self {
        WireScalar::String(value.to_string())
    }
}
