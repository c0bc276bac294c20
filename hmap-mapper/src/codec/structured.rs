//! Structured (JSON) conversions for collections and nested objects.

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hmap_common::{MapperError, MapperResult, WireScalar};

use super::{FieldValue, ReaderContext, ValueKind, WriterContext};

/// Stores a nested object as JSON text in one field.
///
/// The wrapped type's own serde attributes decide member naming;
/// `#[serde(rename_all = "camelCase")]` matches the default field formatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> From<T> for Json<T> {
    fn from(value: T) -> Self {
        Json(value)
    }
}

/// Removes `null` members from every object in `value`.
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(members) => {
            members.retain(|_, member| !member.is_null());
            members.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

fn to_structured<T: Serialize>(value: &T, ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
    let text = if ctx.json().omit_nulls {
        let mut tree = serde_json::to_value(value)?;
        strip_nulls(&mut tree);
        serde_json::to_string(&tree)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(WireScalar::Structured(text))
}

fn from_structured<T: DeserializeOwned>(scalar: &WireScalar) -> MapperResult<T> {
    let text = scalar
        .as_text()
        .ok_or_else(|| MapperError::type_mismatch("json", scalar))?;
    serde_json::from_str(&text).map_err(|err| MapperError::type_mismatch("json", err))
}

impl<T> FieldValue for Json<T>
where
    T: Serialize + DeserializeOwned + Default + PartialEq + Send + Sync + 'static,
{
    const KIND: ValueKind = ValueKind::Structured;

    fn is_default_value(&self) -> bool {
        self.0 == T::default()
    }

    fn encode_value(&self, ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        to_structured(&self.0, ctx)
    }

    fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
        from_structured(scalar).map(Json)
    }
}

macro_rules! impl_collection {
    ($($ty:ident < $($param:ident),+ >),+ $(,)?) => {
        $(
            impl<V> FieldValue for $ty<$($param),+>
            where
                V: Serialize + DeserializeOwned + Send + Sync + 'static,
            {
                const KIND: ValueKind = ValueKind::Structured;

                fn is_default_value(&self) -> bool {
                    self.is_empty()
                }

                fn encode_value(&self, ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
                    to_structured(self, ctx)
                }

                fn decode_value(scalar: &WireScalar, _ctx: &ReaderContext<'_>) -> MapperResult<Self> {
                    from_structured(scalar)
                }

                fn null_equivalent(&self, ctx: &ReaderContext<'_>) -> bool {
                    ctx.ignore_defaults() && self.is_empty()
                }
            }
        )+
    };
}

impl_collection!(Vec<V>, HashMap<String, V>, BTreeMap<String, V>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::config::{JsonOptions, MapperConfig};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Address {
        street_name: String,
        unit: Option<u32>,
    }

    #[test]
    fn nested_objects_use_serde_naming_and_omit_nulls() {
        let config = MapperConfig::default();
        let value = Json(Address {
            street_name: "Main".into(),
            unit: None,
        });
        let scalar = encode(&value, &WriterContext::new(&config)).unwrap();
        assert_eq!(scalar, WireScalar::Structured("{\"streetName\":\"Main\"}".into()));

        let back: Json<Address> = decode(&scalar, &ReaderContext::new(&config)).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn nulls_kept_when_configured() {
        let config = MapperConfig::default().with_json_options(JsonOptions { omit_nulls: false });
        let value = Json(Address::default());
        let scalar = encode(&value, &WriterContext::new(&config)).unwrap();
        assert_eq!(
            scalar,
            WireScalar::Structured("{\"streetName\":\"\",\"unit\":null}".into())
        );
    }

    #[test]
    fn empty_collections_are_elided() {
        let config = MapperConfig::default().with_ignore_defaults(true);
        let ctx = WriterContext::new(&config);
        assert_eq!(encode(&Vec::<i32>::new(), &ctx).unwrap(), WireScalar::Absent);
        assert_eq!(encode(&Json(Address::default()), &ctx).unwrap(), WireScalar::Absent);
        assert_eq!(
            encode(&vec![1, 2], &ctx).unwrap(),
            WireScalar::Structured("[1,2]".into())
        );
    }

    #[test]
    fn empty_collection_is_none_for_nullable_under_elision() {
        let config = MapperConfig::default().with_ignore_defaults(true);
        let ctx = ReaderContext::new(&config);
        let empty = WireScalar::String("[]".into());
        assert_eq!(decode::<Option<Vec<i32>>>(&empty, &ctx).unwrap(), None);

        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        assert_eq!(decode::<Option<Vec<i32>>>(&empty, &ctx).unwrap(), Some(vec![]));
    }

    #[test]
    fn maps_round_trip() {
        let config = MapperConfig::default();
        let mut tags = BTreeMap::new();
        tags.insert("role".to_string(), "admin".to_string());
        let scalar = encode(&tags, &WriterContext::new(&config)).unwrap();
        assert_eq!(scalar, WireScalar::Structured("{\"role\":\"admin\"}".into()));
        let back: BTreeMap<String, String> = decode(&scalar, &ReaderContext::new(&config)).unwrap();
        assert_eq!(back, tags);
    }

    #[test]
    fn malformed_text_is_a_type_mismatch() {
        let config = MapperConfig::default();
        let ctx = ReaderContext::new(&config);
        let result = decode::<Vec<i32>>(&WireScalar::String("[1,".into()), &ctx);
        assert!(matches!(result, Err(MapperError::TypeMismatch { expected: "json", .. })));
    }
}
