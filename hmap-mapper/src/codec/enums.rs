//! Enumerations stored by their integer representation.

use hmap_common::{MapperError, MapperResult, WireScalar};

use super::{ReaderContext, WriterContext};

/// An enumeration with a stable integer representation.
///
/// Implement it with `impl_wire_enum!`, which also implements `FieldValue`.
pub trait WireEnum: Sized {
    fn to_repr(&self) -> i64;
    fn from_repr(repr: i64) -> Option<Self>;
}

pub fn encode_enum<E: WireEnum>(value: &E, _ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
    Ok(WireScalar::Integer(value.to_repr()))
}

pub fn decode_enum<E: WireEnum>(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<E> {
    let repr = scalar
        .as_i64()
        .ok_or_else(|| MapperError::type_mismatch(std::any::type_name::<E>(), scalar))?;
    E::from_repr(repr).ok_or_else(|| MapperError::type_mismatch(std::any::type_name::<E>(), repr))
}

/// Implements `WireEnum` and `FieldValue` for a fieldless enum.
///
/// The enum must implement `Default`; its default variant is the one elided
/// under `ignore_defaults`. A zero representation read into an `Option`
/// field decodes to `None` under elision.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, Default, PartialEq)]
/// enum Status { #[default] Unknown, Active, Banned }
///
/// impl_wire_enum!(Status { Unknown = 0, Active = 1, Banned = 2 });
/// ```
#[macro_export]
macro_rules! impl_wire_enum {
    ($ty:ty { $($variant:ident = $repr:expr),+ $(,)? }) => {
        impl $crate::codec::WireEnum for $ty {
            fn to_repr(&self) -> i64 {
                match self {
                    $(Self::$variant => $repr,)+
                }
            }

            fn from_repr(repr: i64) -> ::std::option::Option<Self> {
                $(
                    if repr == $repr {
                        return ::std::option::Option::Some(Self::$variant);
                    }
                )+
                ::std::option::Option::None
            }
        }

        impl $crate::codec::FieldValue for $ty {
            const KIND: $crate::codec::ValueKind = $crate::codec::ValueKind::Enum;

            fn is_default_value(&self) -> bool {
                $crate::codec::WireEnum::to_repr(self)
                    == $crate::codec::WireEnum::to_repr(&<$ty as ::std::default::Default>::default())
            }

            fn encode_value(
                &self,
                ctx: &$crate::codec::WriterContext<'_>,
            ) -> $crate::MapperResult<$crate::WireScalar> {
                $crate::codec::encode_enum(self, ctx)
            }

            fn decode_value(
                scalar: &$crate::WireScalar,
                ctx: &$crate::codec::ReaderContext<'_>,
            ) -> $crate::MapperResult<Self> {
                $crate::codec::decode_enum(scalar, ctx)
            }

            fn null_equivalent(&self, ctx: &$crate::codec::ReaderContext<'_>) -> bool {
                ctx.ignore_defaults() && $crate::codec::WireEnum::to_repr(self) == 0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::codec::{decode, encode, ReaderContext, WriterContext};
    use crate::config::MapperConfig;
    use hmap_common::{MapperError, WireScalar};

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Status {
        #[default]
        Unknown,
        Active,
        Banned,
    }

    crate::impl_wire_enum!(Status {
        Unknown = 0,
        Active = 1,
        Banned = 7,
    });

    #[test]
    fn enums_use_their_representation() {
        let config = MapperConfig::default().with_ignore_defaults(true);
        let ctx = WriterContext::new(&config);
        assert_eq!(encode(&Status::Banned, &ctx).unwrap(), WireScalar::Integer(7));
        assert_eq!(encode(&Status::Unknown, &ctx).unwrap(), WireScalar::Absent);
    }

    #[test]
    fn unknown_representation_is_a_type_mismatch() {
        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        assert_eq!(
            decode::<Status>(&WireScalar::String("1".into()), &ctx).unwrap(),
            Status::Active
        );
        assert!(matches!(
            decode::<Status>(&WireScalar::Integer(3), &ctx),
            Err(MapperError::TypeMismatch { .. })
        ));
        assert!(decode::<Status>(&WireScalar::String("active".into()), &ctx).is_err());
    }

    #[test]
    fn zero_is_none_for_nullable_only_under_elision() {
        let zero = WireScalar::Integer(0);

        let config = MapperConfig::default().with_ignore_defaults(true);
        let ctx = ReaderContext::new(&config);
        assert_eq!(decode::<Option<Status>>(&zero, &ctx).unwrap(), None);

        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        assert_eq!(
            decode::<Option<Status>>(&zero, &ctx).unwrap(),
            Some(Status::Unknown)
        );
    }
}
