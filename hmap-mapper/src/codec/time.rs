//! Date/time and duration conversions, plus serde helpers that give nested
//! objects the same numeric encodings.

use std::time::Duration;

use chrono::{DateTime, Utc};

use hmap_common::{MapperError, MapperResult, WireScalar};

use super::{FieldValue, ReaderContext, ValueKind, WriterContext};
use crate::config::DateResolution;

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

fn is_epoch(value: &DateTime<Utc>) -> bool {
    value.timestamp() == 0 && value.timestamp_subsec_nanos() == 0
}

fn to_ticks(value: &DateTime<Utc>) -> MapperResult<i64> {
    value
        .timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|ticks| ticks.checked_add(i64::from(value.timestamp_subsec_nanos()) / NANOS_PER_TICK))
        .ok_or_else(|| MapperError::type_mismatch("ticks", value))
}

fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let seconds = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    DateTime::from_timestamp(seconds, nanos as u32)
}

impl FieldValue for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::DateTime;

    fn is_default_value(&self) -> bool {
        is_epoch(self)
    }

    fn encode_value(&self, ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        let value = match ctx.date_resolution() {
            DateResolution::Seconds => self.timestamp(),
            DateResolution::Ticks => to_ticks(self)?,
        };
        Ok(WireScalar::Integer(value))
    }

    fn decode_value(scalar: &WireScalar, ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        let value = scalar
            .as_i64()
            .ok_or_else(|| MapperError::type_mismatch("date/time", scalar))?;
        let decoded = match ctx.date_resolution() {
            DateResolution::Seconds => DateTime::from_timestamp(value, 0),
            DateResolution::Ticks => from_ticks(value),
        };
        decoded.ok_or_else(|| MapperError::type_mismatch("date/time", value))
    }

    fn null_equivalent(&self, _ctx: &ReaderContext<'_>) -> bool {
        is_epoch(self)
    }
}

impl FieldValue for Duration {
    const KIND: ValueKind = ValueKind::Duration;

    fn is_default_value(&self) -> bool {
        self.is_zero()
    }

    fn encode_value(&self, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        let millis = i64::try_from(self.as_millis())
            .map_err(|_| MapperError::type_mismatch("duration", format!("{self:?}")))?;
        Ok(WireScalar::Integer(millis))
    }

    fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        let millis = scalar
            .as_i64()
            .and_then(|value| u64::try_from(value).ok())
            .ok_or_else(|| MapperError::type_mismatch("duration", scalar))?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde helper storing `DateTime<Utc>` as whole seconds since the epoch.
///
/// Use with `#[serde(with = "unix_seconds")]` on nested object fields.
pub mod unix_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| D::Error::custom(format!("timestamp {seconds} out of range")))
    }
}

/// Serde helper storing `Duration` as total milliseconds.
///
/// Use with `#[serde(with = "duration_millis")]` on nested object fields.
pub mod duration_millis {
    use std::time::Duration;

    use serde::{ser::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom("duration too large"))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::config::MapperConfig;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};

    fn moment() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap()
    }

    #[test]
    fn dates_encode_as_epoch_seconds() {
        let config = MapperConfig::default();
        let ctx = WriterContext::new(&config);
        assert_eq!(
            encode(&moment(), &ctx).unwrap(),
            WireScalar::Integer(moment().timestamp())
        );
    }

    #[test]
    fn ticks_keep_sub_second_precision() {
        let config = MapperConfig::default().with_date_resolution(DateResolution::Ticks);
        let value = moment() + chrono::Duration::nanoseconds(1_234_500);
        let scalar = encode(&value, &WriterContext::new(&config)).unwrap();
        assert_eq!(scalar.as_i64(), Some(moment().timestamp() * TICKS_PER_SECOND + 12_345));

        let decoded: DateTime<Utc> = decode(&scalar, &ReaderContext::new(&config)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn ticks_count_from_the_unix_epoch() {
        let config = MapperConfig::default().with_date_resolution(DateResolution::Ticks);
        let one_second = DateTime::from_timestamp(1, 0).unwrap();
        let scalar = encode(&one_second, &WriterContext::new(&config)).unwrap();
        assert_eq!(scalar.as_i64(), Some(TICKS_PER_SECOND));
    }

    #[test]
    fn negative_ticks_decode_before_epoch() {
        let decoded = from_ticks(-1).unwrap();
        assert_eq!(decoded.timestamp(), -1);
        assert_eq!(decoded.timestamp_subsec_nanos(), 999_999_900);
    }

    #[test]
    fn zero_decodes_to_none_for_nullable_dates() {
        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        let zero = WireScalar::String("0".into());
        assert_eq!(decode::<Option<DateTime<Utc>>>(&zero, &ctx).unwrap(), None);
        assert_eq!(decode::<DateTime<Utc>>(&zero, &ctx).unwrap(), DateTime::<Utc>::default());
        assert!(decode::<DateTime<Utc>>(&WireScalar::String("soon".into()), &ctx).is_err());
    }

    #[test]
    fn durations_use_milliseconds() {
        let config = MapperConfig::default();
        let scalar = encode(&Duration::from_millis(1500), &WriterContext::new(&config)).unwrap();
        assert_eq!(scalar, WireScalar::Integer(1500));
        let ctx = ReaderContext::new(&config);
        assert!(decode::<Duration>(&WireScalar::Integer(-1), &ctx).is_err());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        #[serde(with = "unix_seconds")]
        started: DateTime<Utc>,
        #[serde(with = "duration_millis")]
        idle: Duration,
    }

    #[test]
    fn serde_helpers_use_numeric_forms() {
        let session = Session {
            started: moment(),
            idle: Duration::from_secs(2),
        };
        let text = serde_json::to_string(&session).unwrap();
        assert_eq!(
            text,
            format!("{{\"started\":{},\"idle\":2000}}", moment().timestamp())
        );
        let back: Session = serde_json::from_str(&text).unwrap();
        assert_eq!(back, session);
    }
}
