// hmap-engine - Sharded in-memory hash store
//
// Implements the async store interface from hmap-common without a network
// hop, for embedded callers, samples and tests.

pub mod batch;
pub mod memory;
pub mod value;

// Re-export for convenience
pub use batch::MemoryBatch;
pub use memory::{ExpirationHandle, MemoryStore};
pub use value::Value;
