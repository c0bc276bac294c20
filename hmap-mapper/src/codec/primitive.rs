//! Built-in conversions for booleans, numbers and text.

use hmap_common::{MapperError, MapperResult, WireScalar};

use super::{FieldValue, ReaderContext, ValueKind, WriterContext};

fn integral(scalar: &WireScalar, expected: &'static str) -> MapperResult<i64> {
    scalar
        .as_i64()
        .ok_or_else(|| MapperError::type_mismatch(expected, scalar))
}

impl FieldValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn is_default_value(&self) -> bool {
        !*self
    }

    fn encode_value(&self, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        Ok(WireScalar::from(*self))
    }

    fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        match scalar {
            WireScalar::Integer(value) => Ok(*value != 0),
            WireScalar::Float(value) => Ok(*value != 0.0),
            WireScalar::String(text) | WireScalar::Structured(text) => {
                let text = text.trim();
                if text.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if text.is_empty() || text.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    text.parse::<i64>()
                        .map(|value| value != 0)
                        .map_err(|_| MapperError::type_mismatch("bool", text))
                }
            }
            WireScalar::Absent => Ok(false),
        }
    }
}

macro_rules! impl_signed {
    ($($ty:ty => $name:literal),+ $(,)?) => {
        $(
            impl FieldValue for $ty {
                const KIND: ValueKind = ValueKind::Integer;

                fn is_default_value(&self) -> bool {
                    *self == 0 || *self == <$ty>::MIN
                }

                fn encode_value(&self, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
                    Ok(WireScalar::Integer(i64::from(*self)))
                }

                fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
                    let value = integral(scalar, $name)?;
                    <$ty>::try_from(value).map_err(|_| MapperError::type_mismatch($name, value))
                }
            }
        )+
    };
}

impl_signed!(i32 => "i32", i64 => "i64");

impl FieldValue for u32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn is_default_value(&self) -> bool {
        *self == 0
    }

    fn encode_value(&self, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        Ok(WireScalar::Integer(i64::from(*self)))
    }

    fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        let value = integral(scalar, "u32")?;
        u32::try_from(value).map_err(|_| MapperError::type_mismatch("u32", value))
    }
}

impl FieldValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn is_default_value(&self) -> bool {
        *self == 0.0 || self.is_nan() || *self == f64::MIN
    }

    fn encode_value(&self, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        Ok(WireScalar::Float(*self))
    }

    fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        scalar
            .as_f64()
            .ok_or_else(|| MapperError::type_mismatch("f64", scalar))
    }
}

impl FieldValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn is_default_value(&self) -> bool {
        *self == 0.0 || self.is_nan() || *self == f32::MIN
    }

    fn encode_value(&self, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        Ok(WireScalar::Float(f64::from(*self)))
    }

    fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        scalar
            .as_f64()
            .map(|value| value as f32)
            .ok_or_else(|| MapperError::type_mismatch("f32", scalar))
    }
}

impl FieldValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn is_default_value(&self) -> bool {
        self.trim().is_empty()
    }

    fn encode_value(&self, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        if self.trim().is_empty() {
            return Ok(WireScalar::String(String::new()));
        }
        Ok(WireScalar::String(self.clone()))
    }

    fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        Ok(scalar
            .as_text()
            .map(|text| text.into_owned())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::config::MapperConfig;

    fn text(value: &str) -> WireScalar {
        WireScalar::String(value.to_string())
    }

    #[test]
    fn integers_are_elided_at_zero_and_min() {
        let config = MapperConfig::default().with_ignore_defaults(true);
        let ctx = WriterContext::new(&config);
        assert_eq!(encode(&0i32, &ctx).unwrap(), WireScalar::Absent);
        assert_eq!(encode(&i64::MIN, &ctx).unwrap(), WireScalar::Absent);
        assert_eq!(encode(&7u32, &ctx).unwrap(), WireScalar::Integer(7));
        assert_eq!(encode(&f64::NAN, &ctx).unwrap(), WireScalar::Absent);
        assert_eq!(encode(&false, &ctx).unwrap(), WireScalar::Absent);
    }

    #[test]
    fn defaults_are_explicit_without_elision() {
        let config = MapperConfig::default();
        let ctx = WriterContext::new(&config);
        assert_eq!(encode(&0i32, &ctx).unwrap(), WireScalar::Integer(0));
        assert_eq!(encode(&false, &ctx).unwrap(), WireScalar::Integer(0));
        assert_eq!(encode(&"  ".to_string(), &ctx).unwrap(), text(""));
    }

    #[test]
    fn integer_targets_reject_non_integral_scalars() {
        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        assert!(matches!(
            decode::<i32>(&text("3.5"), &ctx),
            Err(MapperError::TypeMismatch { expected: "i32", .. })
        ));
        assert!(decode::<i64>(&WireScalar::Float(2.0), &ctx).is_err());
        assert!(decode::<i32>(&text("4294967296"), &ctx).is_err());
        assert!(decode::<u32>(&text("-1"), &ctx).is_err());
        assert_eq!(decode::<i64>(&text(" 42 "), &ctx).unwrap(), 42);
    }

    #[test]
    fn floats_accept_integers_and_infinity() {
        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        assert_eq!(decode::<f64>(&text("3"), &ctx).unwrap(), 3.0);
        assert_eq!(decode::<f64>(&text("-inf"), &ctx).unwrap(), f64::NEG_INFINITY);
        assert!(decode::<f32>(&text("abc"), &ctx).is_err());
    }

    #[test]
    fn booleans_follow_store_coercion() {
        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        assert!(decode::<bool>(&text("1"), &ctx).unwrap());
        assert!(decode::<bool>(&text("TRUE"), &ctx).unwrap());
        assert!(!decode::<bool>(&text("0"), &ctx).unwrap());
        assert!(!decode::<bool>(&text("false"), &ctx).unwrap());
        assert!(!decode::<bool>(&text(""), &ctx).unwrap());
        assert!(decode::<bool>(&WireScalar::Integer(5), &ctx).unwrap());
        assert!(decode::<bool>(&text("nope"), &ctx).is_err());
    }
}
