//! # Mapper Configuration
//!
//! Purpose: Hold every setting the codec and the operation builders read.
//!
//! ## Design Principles
//! 1. **Immutable Snapshot**: A config is built once, wrapped in `Arc`, and
//!    handed to every provider, batch, and codec call. Changing settings means
//!    building a new snapshot; operations in flight keep the one they started
//!    with.
//! 2. **Builder Style**: `with_*` methods consume and return the config so a
//!    setup reads as one expression.
//!
//! ## Usage
//!
//! ```ignore
//! let config = MapperConfig::default()
//!     .with_ignore_defaults(true)
//!     .with_date_resolution(DateResolution::Ticks)
//!     .with_override::<Uuid>(UuidCodec)
//!     .into_shared();
//! ```

use std::fmt;
use std::sync::Arc;

use crate::codec::{FieldValue, OverrideRegistry, ValueCodec};
use crate::field::{CamelCase, FieldFormatter};

/// Epoch encoding used for date/time values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateResolution {
    /// Whole seconds since the Unix epoch.
    #[default]
    Seconds,
    /// 100-nanosecond ticks since the Unix epoch, not since year 1.
    Ticks,
}

/// Options applied to structured (JSON) text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonOptions {
    /// Strip `null` object members from encoded text.
    pub omit_nulls: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        JsonOptions { omit_nulls: true }
    }
}

/// Settings shared by all mapping operations.
#[derive(Clone)]
pub struct MapperConfig {
    /// Elide values equal to their type's default on write.
    pub ignore_defaults: bool,
    pub json: JsonOptions,
    pub field_formatter: Arc<dyn FieldFormatter>,
    pub date_resolution: DateResolution,
    pub overrides: OverrideRegistry,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            ignore_defaults: false,
            json: JsonOptions::default(),
            field_formatter: Arc::new(CamelCase),
            date_resolution: DateResolution::default(),
            overrides: OverrideRegistry::default(),
        }
    }
}

impl fmt::Debug for MapperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperConfig")
            .field("ignore_defaults", &self.ignore_defaults)
            .field("json", &self.json)
            .field("field_formatter", &self.field_formatter)
            .field("date_resolution", &self.date_resolution)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

impl MapperConfig {
    pub fn with_ignore_defaults(mut self, ignore_defaults: bool) -> Self {
        self.ignore_defaults = ignore_defaults;
        self
    }

    pub fn with_json_options(mut self, json: JsonOptions) -> Self {
        self.json = json;
        self
    }

    pub fn with_field_formatter(mut self, formatter: impl FieldFormatter + 'static) -> Self {
        self.field_formatter = Arc::new(formatter);
        self
    }

    pub fn with_date_resolution(mut self, resolution: DateResolution) -> Self {
        self.date_resolution = resolution;
        self
    }

    /// Registers an override codec for `T`, replacing any earlier one.
    pub fn with_override<T: FieldValue>(mut self, codec: impl ValueCodec<T> + 'static) -> Self {
        self.overrides.register::<T>(codec);
        self
    }

    /// Wraps the config into the shared snapshot handed to providers.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Formats a logical field name with the configured formatter.
    pub fn wire_name(&self, logical: &str) -> String {
        self.field_formatter.format(logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Identity;

    #[test]
    fn defaults_match_documented_values() {
        let config = MapperConfig::default();
        assert!(!config.ignore_defaults);
        assert!(config.json.omit_nulls);
        assert_eq!(config.date_resolution, DateResolution::Seconds);
        assert_eq!(config.wire_name("user_name"), "userName");
        assert!(config.overrides.is_empty());
    }

    #[test]
    fn builder_replaces_settings() {
        let config = MapperConfig::default()
            .with_ignore_defaults(true)
            .with_field_formatter(Identity)
            .with_date_resolution(DateResolution::Ticks)
            .with_json_options(JsonOptions { omit_nulls: false });
        assert!(config.ignore_defaults);
        assert_eq!(config.wire_name("user_name"), "user_name");
        assert_eq!(config.date_resolution, DateResolution::Ticks);
        assert!(!config.json.omit_nulls);
    }
}
