// hmap-mapper - Typed mapping of application values onto hash stores
//
// This crate converts strongly-typed models into hash fields and back, and
// queues mapped operations into batches sent as one round trip.

pub mod batch;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod entry;
pub mod field;
pub mod key;
pub mod operation;
mod planner;
pub mod provider;

// Re-export for convenience
pub use batch::{ReadBatch, WriteBatch};
pub use codec::{
    decode, encode, FieldValue, Json, OverrideRegistry, ReaderContext, ValueCodec, ValueKind,
    WireEnum, WriterContext,
};
pub use config::{DateResolution, JsonOptions, MapperConfig};
pub use descriptor::{
    DescriptorCache, FieldDescriptor, FieldSpec, HashModel, ResolvedFields, TypeDescriptor,
};
pub use entry::CacheEntry;
pub use field::{CamelCase, FieldFormatter, Identity};
pub use key::CacheKey;
pub use operation::{Operation, RawReply};
pub use provider::CacheProvider;

pub use hmap_common::{
    CommandFlags, CommandKind, MapperError, MapperResult, SetCondition, StoreError, WireScalar,
};
