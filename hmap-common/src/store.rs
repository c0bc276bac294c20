//! # Store Interface
//!
//! Purpose: The only boundary between the mapper and a concrete hash store.
//!
//! ## Design Principles
//! 1. **Register Eagerly, Resolve Lazily**: every method registers its command
//!    before returning. On a batch handle nothing is sent until `flush`, but
//!    the returned future already owns its reply slot.
//! 2. **Owned Futures**: futures are `'static` so the mapper can spawn them
//!    and join them in any order.
//! 3. **Flags Pass Through**: `CommandFlags` is handed to the store unchanged.
//!
//! ## Usage Notes
//!
//! - `HashStore` is the long-lived handle (a connection or an engine).
//! - `StoreBatch` collects commands; `flush` dispatches all of them at once.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::command::{CommandFlags, SetCondition};
use crate::error::StoreResult;
use crate::scalar::WireScalar;

/// Boxed future returned by every store command.
pub type StoreFuture<T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'static>>;

/// Wraps an already known result in a `StoreFuture`.
pub fn ready<T: Send + 'static>(result: StoreResult<T>) -> StoreFuture<T> {
    Box::pin(std::future::ready(result))
}

/// Hash-oriented commands shared by stores and batches.
pub trait HashCommands: Send + Sync {
    /// Reads one field; `Absent` when the key or field is missing.
    fn hash_get(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<WireScalar>;

    /// Reads several fields, one scalar per requested field, in order.
    fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
        flags: CommandFlags,
    ) -> StoreFuture<Vec<WireScalar>>;

    /// Writes one field.
    ///
    /// Unconditional writes return true when the field was created. Conditional
    /// writes return true when the condition held and the value was written.
    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: WireScalar,
        condition: SetCondition,
        flags: CommandFlags,
    ) -> StoreFuture<bool>;

    /// Writes several fields unconditionally.
    fn hash_set_many(
        &self,
        key: &str,
        entries: &[(String, WireScalar)],
        flags: CommandFlags,
    ) -> StoreFuture<()>;

    /// Removes one field. Returns true when the field existed.
    fn hash_delete(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<bool>;

    /// Removes a key. Returns true when the key existed.
    fn key_delete(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool>;

    /// Adds `by` to a counter key and returns the new value.
    fn string_increment(&self, key: &str, by: i64, flags: CommandFlags) -> StoreFuture<i64>;

    /// Adds `by` to a hash field and returns the new value.
    fn hash_increment(
        &self,
        key: &str,
        field: &str,
        by: i64,
        flags: CommandFlags,
    ) -> StoreFuture<i64>;

    /// Sets a time-to-live on a key. Returns true when the key exists.
    fn key_expire(&self, key: &str, ttl: Duration, flags: CommandFlags) -> StoreFuture<bool>;

    /// Returns true when the key holds a live value.
    fn key_exists(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool>;
}

/// A set of commands dispatched together.
pub trait StoreBatch: HashCommands {
    /// Sends every command registered on this batch as one round trip.
    ///
    /// Resolves once the commands have been handed to the store; individual
    /// command futures resolve when their replies arrive.
    fn flush(&self) -> StoreFuture<()>;
}

/// A long-lived store handle that can open batches.
pub trait HashStore: HashCommands {
    type Batch: StoreBatch + 'static;

    /// Opens an empty batch bound to this store.
    fn create_batch(&self) -> Self::Batch;
}
