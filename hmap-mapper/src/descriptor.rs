//! # Type Descriptors
//!
//! Purpose: Describe, once per model type, which fields can be mapped and how
//! each one is read, written and named on the wire.
//!
//! ## Design Principles
//! 1. **Static Registration**: Models list their fields through `HashModel`
//!    (usually via `hash_model!`); no runtime reflection is involved.
//! 2. **Build Once, Share Forever**: The full descriptor is built on first use,
//!    published in a sharded map, and never mutated. When two callers race on
//!    first use, the first published descriptor wins.
//! 3. **Filter Per Call**: Field filters are applied on every resolution
//!    against the cached descriptor, without rebuilding it.
//!
//! ## Structure Overview
//!
//! ```text
//! DescriptorCache
//!   └── entries: DashMap<TypeId, Arc<TypeDescriptor<M>>>
//!         └── TypeDescriptor<M>
//!               └── fields: Vec<FieldDescriptor<M>>
//!                     ├── logical / wire name
//!                     ├── kind, nullable, override flag
//!                     └── encode / decode closures over the field accessors
//! ```

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use hmap_common::{MapperError, MapperResult, WireScalar};

use crate::codec::{self, FieldValue, ReaderContext, ValueCodec, ValueKind, WriterContext};
use crate::field::FieldFormatter;

type EncodeFn<M> = Box<dyn Fn(&M, &WriterContext<'_>) -> MapperResult<WireScalar> + Send + Sync>;
type DecodeFn<M> =
    Box<dyn Fn(&mut M, &WireScalar, &ReaderContext<'_>) -> MapperResult<()> + Send + Sync>;

/// A model type whose fields map onto one hash.
pub trait HashModel: Default + Send + Sync + 'static {
    /// Mappable fields in declaration order.
    fn fields() -> Vec<FieldSpec<Self>>;
}

/// Registration of one model field: its name and typed accessors.
pub struct FieldSpec<M> {
    name: &'static str,
    kind: ValueKind,
    nullable: bool,
    has_override: bool,
    encode: EncodeFn<M>,
    decode: DecodeFn<M>,
}

impl<M: 'static> FieldSpec<M> {
    /// Registers a field converted by its `FieldValue` impl.
    pub fn new<F: FieldValue>(
        name: &'static str,
        get: fn(&M) -> &F,
        get_mut: fn(&mut M) -> &mut F,
    ) -> Self {
        Self::build(name, get, get_mut, None)
    }

    /// Registers a field converted by its own codec, ahead of any override
    /// registered for the field's type.
    pub fn with_codec<F: FieldValue>(
        name: &'static str,
        get: fn(&M) -> &F,
        get_mut: fn(&mut M) -> &mut F,
        codec: impl ValueCodec<F> + 'static,
    ) -> Self {
        Self::build(name, get, get_mut, Some(Arc::new(codec)))
    }

    fn build<F: FieldValue>(
        name: &'static str,
        get: fn(&M) -> &F,
        get_mut: fn(&mut M) -> &mut F,
        codec: Option<Arc<dyn ValueCodec<F>>>,
    ) -> Self {
        let has_override = codec.is_some();
        let write_codec = codec.clone();
        let encode = move |model: &M, ctx: &WriterContext<'_>| match &write_codec {
            Some(codec) => codec.encode(get(model), ctx),
            None => codec::encode(get(model), ctx),
        };
        let decode = move |model: &mut M, scalar: &WireScalar, ctx: &ReaderContext<'_>| {
            let value = match &codec {
                Some(codec) => codec.decode(scalar, ctx)?,
                None => codec::decode::<F>(scalar, ctx)?,
            };
            *get_mut(model) = value;
            Ok(())
        };

        FieldSpec {
            name,
            kind: F::KIND,
            nullable: F::NULLABLE,
            has_override,
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// One mappable field of a model with its resolved wire name.
pub struct FieldDescriptor<M> {
    spec: FieldSpec<M>,
    wire_name: String,
}

impl<M> FieldDescriptor<M> {
    pub fn logical_name(&self) -> &'static str {
        self.spec.name
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn kind(&self) -> ValueKind {
        self.spec.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.spec.nullable
    }

    /// True when the field carries its own codec.
    pub fn has_override(&self) -> bool {
        self.spec.has_override
    }

    /// Encodes this field of `model`.
    pub fn encode(&self, model: &M, ctx: &WriterContext<'_>) -> MapperResult<WireScalar> {
        (self.spec.encode)(model, ctx)
    }

    /// Decodes `scalar` into this field of `model`.
    pub fn decode_into(
        &self,
        model: &mut M,
        scalar: &WireScalar,
        ctx: &ReaderContext<'_>,
    ) -> MapperResult<()> {
        (self.spec.decode)(model, scalar, ctx)
    }

    fn matches(&self, name: &str) -> bool {
        self.wire_name.eq_ignore_ascii_case(name) || self.spec.name.eq_ignore_ascii_case(name)
    }
}

impl<M> fmt::Debug for FieldDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("logical_name", &self.spec.name)
            .field("wire_name", &self.wire_name)
            .field("kind", &self.spec.kind)
            .field("nullable", &self.spec.nullable)
            .field("has_override", &self.spec.has_override)
            .finish()
    }
}

/// All mappable fields of one model type, in declaration order.
pub struct TypeDescriptor<M> {
    type_name: &'static str,
    fields: Vec<FieldDescriptor<M>>,
}

impl<M: HashModel> TypeDescriptor<M> {
    /// Builds the descriptor, rejecting empty models and duplicate wire names.
    pub fn build(formatter: &dyn FieldFormatter) -> MapperResult<Self> {
        let type_name = std::any::type_name::<M>();
        let specs = M::fields();
        if specs.is_empty() {
            return Err(MapperError::invalid_mapping(format!(
                "{type_name} has no mappable fields"
            )));
        }

        let mut seen = HashSet::with_capacity(specs.len());
        let mut fields = Vec::with_capacity(specs.len());
        for spec in specs {
            let wire_name = formatter.format(spec.name);
            if !seen.insert(wire_name.clone()) {
                return Err(MapperError::invalid_mapping(format!(
                    "duplicate wire name '{wire_name}' on {type_name}"
                )));
            }
            fields.push(FieldDescriptor { spec, wire_name });
        }

        Ok(TypeDescriptor { type_name, fields })
    }
}

impl<M> TypeDescriptor<M> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor<M>] {
        &self.fields
    }

    /// Finds a field by wire or logical name, ignoring ASCII case.
    pub fn find(&self, name: &str) -> Option<&FieldDescriptor<M>> {
        self.fields.iter().find(|field| field.matches(name))
    }
}

impl<M> fmt::Debug for TypeDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// The fields selected for one operation, in request order.
pub struct ResolvedFields<M> {
    descriptor: Arc<TypeDescriptor<M>>,
    indices: Vec<usize>,
}

impl<M> fmt::Debug for ResolvedFields<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<M> ResolvedFields<M> {
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor<M>> + '_ {
        self.indices.iter().map(|&idx| &self.descriptor.fields[idx])
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn wire_names(&self) -> Vec<String> {
        self.iter().map(|field| field.wire_name.clone()).collect()
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor<M>> {
        &self.descriptor
    }
}

impl<M> Clone for ResolvedFields<M> {
    fn clone(&self) -> Self {
        ResolvedFields {
            descriptor: Arc::clone(&self.descriptor),
            indices: self.indices.clone(),
        }
    }
}

/// Process-wide cache of type descriptors for one field formatter.
pub struct DescriptorCache {
    formatter: Arc<dyn FieldFormatter>,
    entries: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DescriptorCache {
    pub fn new(formatter: Arc<dyn FieldFormatter>) -> Self {
        DescriptorCache {
            formatter,
            entries: DashMap::new(),
        }
    }

    /// Returns the cached descriptor of `M`, building it on first use.
    pub fn descriptor<M: HashModel>(&self) -> MapperResult<Arc<TypeDescriptor<M>>> {
        let id = TypeId::of::<M>();
        let cached = self.entries.get(&id).map(|entry| Arc::clone(entry.value()));
        let shared = match cached {
            Some(shared) => shared,
            None => {
                let built: Arc<dyn Any + Send + Sync> =
                    Arc::new(TypeDescriptor::<M>::build(self.formatter.as_ref())?);
                let entry = self.entries.entry(id).or_insert(built);
                Arc::clone(entry.value())
            }
        };

        shared.downcast::<TypeDescriptor<M>>().map_err(|_| {
            MapperError::invalid_mapping(format!(
                "descriptor cache holds a foreign entry for {}",
                std::any::type_name::<M>()
            ))
        })
    }

    /// Resolves the fields of `M` named in `requested`.
    ///
    /// An empty request selects every field in declaration order. Otherwise
    /// fields match on wire or logical name ignoring ASCII case, in request
    /// order, with duplicates collapsed; unknown names are skipped.
    pub fn resolve<M: HashModel, S: AsRef<str>>(
        &self,
        requested: &[S],
    ) -> MapperResult<ResolvedFields<M>> {
        let descriptor = self.descriptor::<M>()?;
        if requested.is_empty() {
            let indices = (0..descriptor.fields.len()).collect();
            return Ok(ResolvedFields {
                descriptor,
                indices,
            });
        }

        let mut indices = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.as_ref();
            match descriptor.fields.iter().position(|field| field.matches(name)) {
                Some(idx) if !indices.contains(&idx) => indices.push(idx),
                Some(_) => {}
                None => debug!(field = name, model = descriptor.type_name, "unknown field skipped"),
            }
        }

        if indices.is_empty() {
            return Err(MapperError::invalid_mapping(format!(
                "none of the requested fields exist on {}",
                descriptor.type_name
            )));
        }
        Ok(ResolvedFields {
            descriptor,
            indices,
        })
    }

    pub fn formatter(&self) -> &dyn FieldFormatter {
        self.formatter.as_ref()
    }

    /// Number of cached model types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("formatter", &self.formatter)
            .field("types", &self.entries.len())
            .finish()
    }
}

/// Implements `HashModel` for a struct by listing its mappable fields.
///
/// Fields are given in declaration order. A field may carry its own codec
/// with `field => codec_expr`.
///
/// ```ignore
/// #[derive(Default)]
/// struct User { name: String, age: i32, tags: Vec<String> }
///
/// hash_model!(User { name, age, tags });
/// ```
#[macro_export]
macro_rules! hash_model {
    (@spec $field:ident) => {
        $crate::descriptor::FieldSpec::<Self>::new(
            ::std::stringify!($field),
            |model| &model.$field,
            |model| &mut model.$field,
        )
    };
    (@spec $field:ident => $codec:expr) => {
        $crate::descriptor::FieldSpec::<Self>::with_codec(
            ::std::stringify!($field),
            |model| &model.$field,
            |model| &mut model.$field,
            $codec,
        )
    };
    ($ty:ty { $($field:ident $(=> $codec:expr)?),+ $(,)? }) => {
        impl $crate::descriptor::HashModel for $ty {
            fn fields() -> ::std::vec::Vec<$crate::descriptor::FieldSpec<Self>> {
                ::std::vec![
                    $($crate::hash_model!(@spec $field $(=> $codec)?)),+
                ]
            }
        }
    };
}
