//! # Value Codec
//!
//! Purpose: Convert typed application values into `WireScalar`s and back.
//!
//! ## Design Principles
//! 1. **Trait Dispatch**: Every storable type implements `FieldValue`; the
//!    compiler picks the conversion, no runtime type matching is involved.
//! 2. **Overrides First**: A `ValueCodec` registered for the exact type wins
//!    over the built-in conversion, for both directions.
//! 3. **Elision At The Edge**: `encode` drops default values when the config
//!    asks for it, so individual impls only describe their representation.
//! 4. **Absent Means Default**: `decode` maps `Absent` (and empty text) to the
//!    type's default, which is `None` for `Option<T>`.
//!
//! ## Supported Types
//!
//! ```text
//! bool                      → Integer 0/1
//! i32, i64, u32             → Integer
//! f32, f64                  → Float
//! String                    → String
//! DateTime<Utc>             → Integer (epoch seconds or ticks)
//! std::time::Duration       → Integer (milliseconds)
//! WireEnum types            → Integer (representation)
//! Vec, HashMap, BTreeMap    → Structured (JSON)
//! Json<T>                   → Structured (JSON)
//! Option<T>                 → as T, Absent for None
//! ```

mod enums;
mod overrides;
mod primitive;
mod structured;
mod time;

pub use enums::{decode_enum, encode_enum, WireEnum};
pub use overrides::{OverrideRegistry, ValueCodec};
pub use structured::Json;
pub use time::{duration_millis, unix_seconds};

use hmap_common::{MapperResult, WireScalar};

use crate::config::{DateResolution, JsonOptions, MapperConfig};

/// Broad category of a field's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Integer,
    Float,
    Text,
    DateTime,
    Duration,
    Enum,
    Structured,
}

/// Settings visible to encoders.
#[derive(Debug, Clone, Copy)]
pub struct WriterContext<'a> {
    config: &'a MapperConfig,
}

impl<'a> WriterContext<'a> {
    pub fn new(config: &'a MapperConfig) -> Self {
        WriterContext { config }
    }

    #[inline]
    pub fn ignore_defaults(&self) -> bool {
        self.config.ignore_defaults
    }

    #[inline]
    pub fn json(&self) -> JsonOptions {
        self.config.json
    }

    #[inline]
    pub fn date_resolution(&self) -> DateResolution {
        self.config.date_resolution
    }

    #[inline]
    pub fn overrides(&self) -> &'a OverrideRegistry {
        &self.config.overrides
    }
}

/// Settings visible to decoders.
#[derive(Debug, Clone, Copy)]
pub struct ReaderContext<'a> {
    config: &'a MapperConfig,
}

impl<'a> ReaderContext<'a> {
    pub fn new(config: &'a MapperConfig) -> Self {
        ReaderContext { config }
    }

    #[inline]
    pub fn ignore_defaults(&self) -> bool {
        self.config.ignore_defaults
    }

    #[inline]
    pub fn date_resolution(&self) -> DateResolution {
        self.config.date_resolution
    }

    #[inline]
    pub fn overrides(&self) -> &'a OverrideRegistry {
        &self.config.overrides
    }
}

/// A type that can be stored in a single hash field.
pub trait FieldValue: Sized + Default + Send + Sync + 'static {
    /// Declared category, recorded in field descriptors.
    const KIND: ValueKind;
    /// True only for `Option<T>`.
    const NULLABLE: bool = false;

    /// Returns true when the value is elided under `ignore_defaults`.
    fn is_default_value(&self) -> bool;

    /// Explicit representation of the value, without elision.
    fn encode_value(&self, ctx: &WriterContext<'_>) -> MapperResult<WireScalar>;

    /// Builds a value from a present, non-empty scalar.
    fn decode_value(scalar: &WireScalar, ctx: &ReaderContext<'_>) -> MapperResult<Self>;

    /// Returns true when a decoded value stands for "no value" in a nullable
    /// field (the epoch for dates, a zero enum or an empty collection under
    /// elision).
    fn null_equivalent(&self, _ctx: &ReaderContext<'_>) -> bool {
        false
    }
}

/// Encodes `value` for storage.
///
/// Override codecs run first; otherwise default values become `Absent` when
/// elision is on.
pub fn encode<T: FieldValue>(value: &T, ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
    if let Some(codec) = ctx.overrides().get::<T>() {
        return codec.encode(value, ctx);
    }
    if ctx.ignore_defaults() && value.is_default_value() {
        return Ok(WireScalar::Absent);
    }
    value.encode_value(ctx)
}

/// Decodes a stored scalar into `T`.
pub fn decode<T: FieldValue>(scalar: &WireScalar, ctx: &ReaderContext<'_>) -> MapperResult<T> {
    if let Some(codec) = ctx.overrides().get::<T>() {
        return codec.decode(scalar, ctx);
    }
    if scalar.is_absent_or_empty() {
        return Ok(T::default());
    }
    T::decode_value(scalar, ctx)
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;

    fn is_default_value(&self) -> bool {
        self.is_none()
    }

    fn encode_value(&self, ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        match self {
            Some(value) => encode(value, ctx),
            None => encode(&T::default(), ctx),
        }
    }

    fn decode_value(scalar: &WireScalar, ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        let value: T = decode(scalar, ctx)?;
        if value.null_equivalent(ctx) {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }
}
