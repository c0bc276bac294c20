//! Caller-supplied codecs that replace the built-in conversion of a type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use hmap_common::{MapperResult, WireScalar};

use super::{FieldValue, ReaderContext, WriterContext};

/// Encode/decode pair for one type, taking priority over `FieldValue`.
pub trait ValueCodec<T>: Send + Sync {
    fn encode(&self, value: &T, ctx: &WriterContext<'_>) -> MapperResult<WireScalar>;
    fn decode(&self, scalar: &WireScalar, ctx: &ReaderContext<'_>) -> MapperResult<T>;
}

/// Override codecs keyed by the exact type they handle.
#[derive(Clone, Default)]
pub struct OverrideRegistry {
    // Each value is a `Box<dyn ValueCodec<T>>` for the `T` of its key.
    codecs: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl OverrideRegistry {
    /// Registers `codec` for `T`, replacing any earlier codec for `T`.
    pub fn register<T: FieldValue>(&mut self, codec: impl ValueCodec<T> + 'static) {
        let boxed: Box<dyn ValueCodec<T>> = Box::new(codec);
        self.codecs.insert(TypeId::of::<T>(), Arc::new(boxed));
    }

    /// Returns the codec registered for `T`, if any.
    pub fn get<T: FieldValue>(&self) -> Option<&dyn ValueCodec<T>> {
        self.codecs
            .get(&TypeId::of::<T>())
            .and_then(|codec| codec.downcast_ref::<Box<dyn ValueCodec<T>>>())
            .map(|codec| codec.as_ref())
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl fmt::Debug for OverrideRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideRegistry")
            .field("codecs", &self.codecs.len())
            .finish()
    }
}
