//! # Memory Batch
//!
//! Queues commands against a `MemoryStore` and applies them in order when the
//! batch is flushed. Every queued command owns a oneshot reply slot, so the
//! futures handed out before `flush` resolve as soon as their command runs.
//!
//! A batch dropped without flushing resolves its outstanding futures with
//! `StoreError::Closed`.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use hmap_common::{
    ready, CommandFlags, HashCommands, SetCondition, StoreBatch, StoreError, StoreFuture,
    StoreResult, WireScalar,
};

use crate::memory::{stored_text, MemoryStore};

type QueuedCommand = Box<dyn FnOnce(&MemoryStore) + Send>;

/// A batch of commands bound to one `MemoryStore`.
pub struct MemoryBatch {
    store: MemoryStore,
    queue: Mutex<Vec<QueuedCommand>>,
}

impl MemoryBatch {
    pub(crate) fn new(store: MemoryStore) -> Self {
        MemoryBatch {
            store,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Number of commands waiting for `flush`.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enqueue<T, F>(&self, flags: CommandFlags, op: F) -> StoreFuture<T>
    where
        T: Default + Send + 'static,
        F: FnOnce(&MemoryStore) -> StoreResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.queue.lock().push(Box::new(move |store: &MemoryStore| {
            // The receiver may be gone for fire-and-forget calls.
            let _ = tx.send(op(store));
        }));

        if flags.is_fire_and_forget() {
            return ready(Ok(T::default()));
        }
        Box::pin(async move { rx.await.unwrap_or(Err(StoreError::Closed)) })
    }
}

impl HashCommands for MemoryBatch {
    fn hash_get(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<WireScalar> {
        let (key, field) = (key.to_string(), field.to_string());
        self.enqueue(flags, move |store| {
            let text = store.hget(&key, &field)?;
            Ok(WireScalar::from_bulk(text.map(String::into_bytes)))
        })
    }

    fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
        flags: CommandFlags,
    ) -> StoreFuture<Vec<WireScalar>> {
        let (key, fields) = (key.to_string(), fields.to_vec());
        self.enqueue(flags, move |store| {
            let values = store.hmget(&key, &fields)?;
            Ok(values
                .into_iter()
                .map(|text| WireScalar::from_bulk(text.map(String::into_bytes)))
                .collect())
        })
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: WireScalar,
        condition: SetCondition,
        flags: CommandFlags,
    ) -> StoreFuture<bool> {
        let (key, field, text) = (key.to_string(), field.to_string(), stored_text(&value));
        self.enqueue(flags, move |store| store.hset(&key, &field, text, condition))
    }

    fn hash_set_many(
        &self,
        key: &str,
        entries: &[(String, WireScalar)],
        flags: CommandFlags,
    ) -> StoreFuture<()> {
        let key = key.to_string();
        let pairs: Vec<(String, String)> = entries
            .iter()
            .map(|(field, value)| (field.clone(), stored_text(value)))
            .collect();
        self.enqueue(flags, move |store| store.hset_many(&key, pairs))
    }

    fn hash_delete(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<bool> {
        let (key, field) = (key.to_string(), field.to_string());
        self.enqueue(flags, move |store| store.hdel(&key, &field))
    }

    fn key_delete(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        let key = key.to_string();
        self.enqueue(flags, move |store| Ok(store.del(&key)))
    }

    fn string_increment(&self, key: &str, by: i64, flags: CommandFlags) -> StoreFuture<i64> {
        let key = key.to_string();
        self.enqueue(flags, move |store| store.incr_by(&key, by))
    }

    fn hash_increment(
        &self,
        key: &str,
        field: &str,
        by: i64,
        flags: CommandFlags,
    ) -> StoreFuture<i64> {
        let (key, field) = (key.to_string(), field.to_string());
        self.enqueue(flags, move |store| store.hincr_by(&key, &field, by))
    }

    fn key_expire(&self, key: &str, ttl: Duration, flags: CommandFlags) -> StoreFuture<bool> {
        let key = key.to_string();
        self.enqueue(flags, move |store| store.expire(&key, ttl))
    }

    fn key_exists(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        let key = key.to_string();
        self.enqueue(flags, move |store| Ok(store.exists(&key)))
    }
}

impl StoreBatch for MemoryBatch {
    fn flush(&self) -> StoreFuture<()> {
        let queued = std::mem::take(&mut *self.queue.lock());
        trace!(commands = queued.len(), "flushing memory batch");
        for command in queued {
            command(&self.store);
        }
        ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmap_common::HashStore;

    #[tokio::test]
    async fn nothing_runs_before_flush() {
        let store = MemoryStore::with_shard_count(2);
        let batch = store.create_batch();

        let write = batch.hash_set(
            "user:1",
            "name",
            WireScalar::from("Arash"),
            SetCondition::Always,
            CommandFlags::None,
        );
        assert_eq!(batch.len(), 1);
        assert!(!store.exists("user:1"));

        batch.flush().await.unwrap();
        assert!(batch.is_empty());
        assert!(write.await.unwrap());
        assert!(store.exists("user:1"));
    }

    #[tokio::test]
    async fn commands_apply_in_queue_order() {
        let store = MemoryStore::with_shard_count(2);
        let batch = store.create_batch();

        let first = batch.hash_increment("user:1", "visits", 2, CommandFlags::None);
        let read = batch.hash_get("user:1", "visits", CommandFlags::None);
        let second = batch.hash_increment("user:1", "visits", 3, CommandFlags::None);
        batch.flush().await.unwrap();

        assert_eq!(second.await.unwrap(), 5);
        assert_eq!(read.await.unwrap().as_i64(), Some(2));
        assert_eq!(first.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn dropped_batch_closes_pending_replies() {
        let store = MemoryStore::with_shard_count(2);
        let batch = store.create_batch();
        let pending = batch.key_delete("user:1", CommandFlags::None);
        drop(batch);

        assert!(matches!(pending.await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn errors_reach_only_their_command() {
        let store = MemoryStore::with_shard_count(2);
        store.incr_by("hits", 1).unwrap();
        let batch = store.create_batch();

        let clash = batch.hash_get("hits", "x", CommandFlags::None);
        let ok = batch.string_increment("hits", 1, CommandFlags::None);
        batch.flush().await.unwrap();

        assert!(clash.await.is_err());
        assert_eq!(ok.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn exists_sees_earlier_writes_in_the_batch() {
        let store = MemoryStore::with_shard_count(2);
        let batch = store.create_batch();

        let before = batch.key_exists("hits", CommandFlags::None);
        let _ = batch.string_increment("hits", 1, CommandFlags::None);
        let after = batch.key_exists("hits", CommandFlags::None);
        let expire = batch.key_expire("hits", Duration::from_secs(u64::MAX), CommandFlags::None);
        batch.flush().await.unwrap();

        assert!(!before.await.unwrap());
        assert!(after.await.unwrap());
        assert!(matches!(expire.await, Err(StoreError::Server { .. })));
    }
}
