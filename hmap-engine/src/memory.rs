//! # In-Memory Hash Store
//!
//! Provide a hash-oriented store with sharded locking and TTL-aware
//! lookups, implementing the async store interface without a network hop.
//!
//! ## Usage
//!
//! - Use `MemoryStore::new()` for a default sharded store.
//! - Use `MemoryStore::with_shard_count` to pin the shard count (tests).
//! - Use `start_expirer` to enable active TTL cleanup in the background.
//! - Use `create_batch` (from `HashStore`) to queue commands and apply them
//!   in order on `flush`.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: Per-shard locks reduce contention under concurrency.
//! 2. **TTL Fast Path**: Expiration is checked on access; expired entries are
//!    invisible to reads and replaced on writes.
//! 3. **Redis Semantics**: Replies mirror what a Redis server answers
//!    (`HSET` reports new fields, empty hashes disappear, `WRONGTYPE` clashes).
//! 4. **Cheap Clones**: `MemoryStore` is an `Arc` handle so batches and
//!    background sweepers share the same shards.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryStore
//!   └── inner: Arc<StoreInner>
//!         ├── hash_state: RandomState
//!         └── shards: Vec<Shard>
//!               └── Shard
//!                     └── entries: RwLock<HashMap<String, Entry>>
//!                           └── Entry { value: Value, expires_at }
//! ```

use std::hash::{BuildHasher, Hasher};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use hmap_common::{
    ready, CommandFlags, HashCommands, HashStore, SetCondition, StoreError, StoreFuture,
    StoreResult, WireScalar,
};

use crate::batch::MemoryBatch;
use crate::value::{parse_counter, wrong_type, Entry, Value};

/// Default shards = CPU count * multiplier to reduce lock contention.
const DEFAULT_SHARD_MULTIPLIER: usize = 4;

type EntryMap = HashMap<String, Entry, RandomState>;

#[derive(Debug)]
struct Shard {
    entries: RwLock<EntryMap>,
}

#[derive(Debug)]
struct StoreInner {
    shards: Vec<Shard>,
    /// Bitmask for fast shard selection (power-of-two shard count).
    shard_mask: usize,
    hash_state: RandomState,
}

/// Sharded in-memory hash store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

/// Handle for the background expiration sweeper.
///
/// Call `stop` to signal shutdown and join the thread.
pub struct ExpirationHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ExpirationHandle {
    /// Stops the sweeper and waits for the thread to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store with a shard count based on CPU parallelism.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        Self::with_shard_count(threads.saturating_mul(DEFAULT_SHARD_MULTIPLIER))
    }

    /// Creates a store with a caller-provided shard count.
    ///
    /// The count is normalized to the next power of two to enable fast masking.
    pub fn with_shard_count(shards: usize) -> Self {
        let shard_count = normalize_shard_count(shards);
        let hash_state = RandomState::new();
        let shards = (0..shard_count)
            .map(|_| Shard {
                entries: RwLock::new(EntryMap::with_hasher(hash_state.clone())),
            })
            .collect();

        MemoryStore {
            inner: Arc::new(StoreInner {
                shards,
                shard_mask: shard_count - 1,
                hash_state,
            }),
        }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = self.inner.hash_state.build_hasher();
        hasher.write(key.as_bytes());
        let idx = (hasher.finish() as usize) & self.inner.shard_mask;
        &self.inner.shards[idx]
    }

    /// Runs `op` against the live value of `key`, if any.
    fn read<R>(&self, key: &str, op: impl FnOnce(Option<&Value>) -> R) -> R {
        let now = Instant::now();
        let entries = self.shard_for(key).entries.read();
        let live = entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| &entry.value);
        op(live)
    }

    /// Runs `op` with write access to the shard after dropping an expired
    /// entry for `key`.
    fn write<R>(&self, key: &str, op: impl FnOnce(&mut EntryMap) -> R) -> R {
        let now = Instant::now();
        let mut entries = self.shard_for(key).entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        op(&mut entries)
    }

    /// Reads one hash field.
    pub fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.read(key, |value| match value {
            None => Ok(None),
            Some(value) => Ok(value.as_hash()?.get(field).cloned()),
        })
    }

    /// Reads several hash fields, one slot per requested field.
    pub fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<String>>> {
        self.read(key, |value| match value {
            None => Ok(vec![None; fields.len()]),
            Some(value) => {
                let hash = value.as_hash()?;
                Ok(fields.iter().map(|field| hash.get(field).cloned()).collect())
            }
        })
    }

    /// Returns every field of a hash (empty when the key is missing).
    pub fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        self.read(key, |value| match value {
            None => Ok(Vec::new()),
            Some(value) => Ok(value
                .as_hash()?
                .iter()
                .map(|(field, text)| (field.clone(), text.clone()))
                .collect()),
        })
    }

    /// Writes one hash field under `condition`.
    pub fn hset(
        &self,
        key: &str,
        field: &str,
        value: String,
        condition: SetCondition,
    ) -> StoreResult<bool> {
        self.write(key, |entries| {
            if let Some(entry) = entries.get_mut(key) {
                let hash = entry.value.as_hash_mut()?;
                let exists = hash.contains_key(field);
                return Ok(match condition {
                    SetCondition::IfMissing if exists => false,
                    SetCondition::IfPresent if !exists => false,
                    SetCondition::Always => {
                        hash.insert(field.to_string(), value);
                        !exists
                    }
                    _ => {
                        hash.insert(field.to_string(), value);
                        true
                    }
                });
            }

            if condition == SetCondition::IfPresent {
                return Ok(false);
            }
            let mut created = Value::empty_hash();
            created.as_hash_mut()?.insert(field.to_string(), value);
            entries.insert(key.to_string(), Entry::new(created));
            Ok(true)
        })
    }

    /// Writes several hash fields at once.
    pub fn hset_many(&self, key: &str, pairs: Vec<(String, String)>) -> StoreResult<()> {
        self.write(key, |entries| {
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::empty_hash()));
            let hash = entry.value.as_hash_mut()?;
            hash.extend(pairs);
            Ok(())
        })
    }

    /// Removes a hash field; the key disappears with its last field.
    pub fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.write(key, |entries| {
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            let removed = entry.value.as_hash_mut()?.remove(field).is_some();
            if entry.value.is_empty_hash() {
                entries.remove(key);
            }
            Ok(removed)
        })
    }

    /// Removes a key and reports whether a live entry existed.
    pub fn del(&self, key: &str) -> bool {
        self.write(key, |entries| entries.remove(key).is_some())
    }

    /// Returns true when `key` holds a live entry.
    pub fn exists(&self, key: &str) -> bool {
        self.read(key, |value| value.is_some())
    }

    /// Adds `by` to a counter key, creating it at zero.
    pub fn incr_by(&self, key: &str, by: i64) -> StoreResult<i64> {
        self.write(key, |entries| {
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::Text("0".to_string())));
            let Value::Text(text) = &mut entry.value else {
                return Err(wrong_type());
            };
            let next = checked_add(parse_counter(text)?, by)?;
            *text = next.to_string();
            Ok(next)
        })
    }

    /// Adds `by` to a hash field, creating it at zero.
    pub fn hincr_by(&self, key: &str, field: &str, by: i64) -> StoreResult<i64> {
        self.write(key, |entries| {
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::empty_hash()));
            let hash = entry.value.as_hash_mut()?;
            let current = match hash.get(field) {
                Some(text) => parse_counter(text)?,
                None => 0,
            };
            let next = checked_add(current, by)?;
            hash.insert(field.to_string(), next.to_string());
            Ok(next)
        })
    }

    /// Sets a TTL for an existing key. Missing keys return false.
    ///
    /// A TTL too large to represent as a deadline is rejected.
    pub fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let deadline = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Server {
                message: "ERR invalid expire time".to_string(),
            })?;
        Ok(self.write(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                true
            }
            None => false,
        }))
    }

    /// Removes expired entries across all shards.
    ///
    /// This is an O(n) scan and is intended for a periodic background sweep.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in &self.inner.shards {
            let mut entries = shard.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            removed += before - entries.len();
        }
        if removed > 0 {
            debug!(removed, "purged expired keys");
        }
        removed
    }

    /// Starts a background thread that periodically removes expired entries.
    ///
    /// The returned handle must be stopped to avoid leaking the thread.
    pub fn start_expirer(&self, interval: Duration) -> ExpirationHandle {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let store = self.clone();

        let join = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                store.purge_expired(Instant::now());
            }
        });

        ExpirationHandle {
            stop,
            join: Some(join),
        }
    }
}

fn checked_add(current: i64, by: i64) -> StoreResult<i64> {
    current.checked_add(by).ok_or_else(|| StoreError::Server {
        message: "ERR increment or decrement would overflow".to_string(),
    })
}

/// Converts a scalar into the text the store keeps.
pub(crate) fn stored_text(value: &WireScalar) -> String {
    value
        .as_text()
        .map(|text| text.into_owned())
        .unwrap_or_default()
}

/// Resolves a command result, honouring fire-and-forget.
pub(crate) fn reply<T: Default + Send + 'static>(
    flags: CommandFlags,
    result: StoreResult<T>,
) -> StoreFuture<T> {
    if flags.is_fire_and_forget() {
        return ready(Ok(T::default()));
    }
    ready(result)
}

impl HashCommands for MemoryStore {
    fn hash_get(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<WireScalar> {
        let result = self
            .hget(key, field)
            .map(|text| WireScalar::from_bulk(text.map(String::into_bytes)));
        reply(flags, result)
    }

    fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
        flags: CommandFlags,
    ) -> StoreFuture<Vec<WireScalar>> {
        let result = self.hmget(key, fields).map(|values| {
            values
                .into_iter()
                .map(|text| WireScalar::from_bulk(text.map(String::into_bytes)))
                .collect()
        });
        reply(flags, result)
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: WireScalar,
        condition: SetCondition,
        flags: CommandFlags,
    ) -> StoreFuture<bool> {
        reply(flags, self.hset(key, field, stored_text(&value), condition))
    }

    fn hash_set_many(
        &self,
        key: &str,
        entries: &[(String, WireScalar)],
        flags: CommandFlags,
    ) -> StoreFuture<()> {
        let pairs = entries
            .iter()
            .map(|(field, value)| (field.clone(), stored_text(value)))
            .collect();
        reply(flags, self.hset_many(key, pairs))
    }

    fn hash_delete(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<bool> {
        reply(flags, self.hdel(key, field))
    }

    fn key_delete(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        reply(flags, Ok(self.del(key)))
    }

    fn string_increment(&self, key: &str, by: i64, flags: CommandFlags) -> StoreFuture<i64> {
        reply(flags, self.incr_by(key, by))
    }

    fn hash_increment(
        &self,
        key: &str,
        field: &str,
        by: i64,
        flags: CommandFlags,
    ) -> StoreFuture<i64> {
        reply(flags, self.hincr_by(key, field, by))
    }

    fn key_expire(&self, key: &str, ttl: Duration, flags: CommandFlags) -> StoreFuture<bool> {
        reply(flags, self.expire(key, ttl))
    }

    fn key_exists(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        reply(flags, Ok(self.exists(key)))
    }
}

impl HashStore for MemoryStore {
    type Batch = MemoryBatch;

    fn create_batch(&self) -> MemoryBatch {
        MemoryBatch::new(self.clone())
    }
}

/// Normalizes shard counts to a power of two for fast masking.
fn normalize_shard_count(count: usize) -> usize {
    count.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hset_reports_new_fields() {
        let store = MemoryStore::with_shard_count(4);
        assert!(store
            .hset("user:1", "name", "Arash".into(), SetCondition::Always)
            .unwrap());
        assert!(!store
            .hset("user:1", "name", "Ali".into(), SetCondition::Always)
            .unwrap());
        assert_eq!(store.hget("user:1", "name").unwrap().as_deref(), Some("Ali"));
    }

    #[test]
    fn conditional_sets() {
        let store = MemoryStore::with_shard_count(2);
        assert!(!store
            .hset("user:1", "name", "x".into(), SetCondition::IfPresent)
            .unwrap());
        assert!(!store.exists("user:1"));

        assert!(store
            .hset("user:1", "name", "x".into(), SetCondition::IfMissing)
            .unwrap());
        assert!(!store
            .hset("user:1", "name", "y".into(), SetCondition::IfMissing)
            .unwrap());
        assert!(store
            .hset("user:1", "name", "z".into(), SetCondition::IfPresent)
            .unwrap());
        assert_eq!(store.hget("user:1", "name").unwrap().as_deref(), Some("z"));
    }

    #[test]
    fn hmget_keeps_request_order() {
        let store = MemoryStore::with_shard_count(2);
        store
            .hset_many("user:1", vec![("a".into(), "1".into()), ("c".into(), "3".into())])
            .unwrap();
        let fields = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let values = store.hmget("user:1", &fields).unwrap();
        assert_eq!(values, vec![Some("3".into()), None, Some("1".into())]);
        assert_eq!(store.hmget("missing", &fields).unwrap(), vec![None, None, None]);
    }

    #[test]
    fn last_hdel_removes_key() {
        let store = MemoryStore::with_shard_count(2);
        store
            .hset("user:1", "bio", "hi".into(), SetCondition::Always)
            .unwrap();
        assert!(store.hdel("user:1", "bio").unwrap());
        assert!(!store.hdel("user:1", "bio").unwrap());
        assert!(!store.exists("user:1"));
    }

    #[test]
    fn counters_and_type_clashes() {
        let store = MemoryStore::with_shard_count(2);
        assert_eq!(store.incr_by("hits", 5).unwrap(), 5);
        assert_eq!(store.incr_by("hits", -7).unwrap(), -2);
        assert_eq!(store.hincr_by("user:1", "age", 3).unwrap(), 3);

        assert!(matches!(
            store.hget("hits", "x"),
            Err(StoreError::Server { .. })
        ));
        assert!(store.incr_by("user:1", 1).is_err());
    }

    #[test]
    fn increment_overflow_is_an_error() {
        let store = MemoryStore::with_shard_count(1);
        store.incr_by("n", i64::MAX).unwrap();
        assert!(store.incr_by("n", 1).is_err());
        assert_eq!(store.incr_by("n", 0).unwrap(), i64::MAX);
    }

    #[test]
    fn expire_hides_value() {
        let store = MemoryStore::with_shard_count(2);
        assert!(!store.expire("user:1", Duration::from_secs(1)).unwrap());
        store
            .hset("user:1", "name", "x".into(), SetCondition::Always)
            .unwrap();
        assert!(store.expire("user:1", Duration::from_millis(1)).unwrap());
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.hget("user:1", "name").unwrap().is_none());
        assert!(!store.exists("user:1"));
    }

    #[test]
    fn unrepresentable_ttl_is_rejected() {
        let store = MemoryStore::with_shard_count(1);
        store.incr_by("hits", 1).unwrap();
        assert!(matches!(
            store.expire("hits", Duration::from_secs(u64::MAX)),
            Err(StoreError::Server { .. })
        ));
        assert!(matches!(
            store.expire("hits", Duration::MAX),
            Err(StoreError::Server { .. })
        ));
        assert!(store.exists("hits"));
    }

    #[test]
    fn purge_expired_removes_entries() {
        let store = MemoryStore::with_shard_count(2);
        store.incr_by("a", 1).unwrap();
        store.incr_by("b", 1).unwrap();
        store.expire("a", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(store.purge_expired(Instant::now()), 1);
        assert!(store.exists("b"));
    }

    #[test]
    fn expirer_thread_clears_expired() {
        let store = MemoryStore::with_shard_count(2);
        store.incr_by("a", 1).unwrap();
        store.expire("a", Duration::from_millis(1)).unwrap();

        let handle = store.start_expirer(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        handle.stop();

        assert_eq!(store.purge_expired(Instant::now()), 0);
    }

    #[tokio::test]
    async fn trait_calls_return_wire_scalars() {
        let store = MemoryStore::with_shard_count(2);
        let written = store
            .hash_set(
                "user:1",
                "age",
                WireScalar::Integer(33),
                SetCondition::Always,
                CommandFlags::None,
            )
            .await
            .unwrap();
        assert!(written);

        let value = store
            .hash_get("user:1", "age", CommandFlags::None)
            .await
            .unwrap();
        assert_eq!(value, WireScalar::String("33".into()));
        assert_eq!(value.as_i64(), Some(33));

        let missing = store
            .hash_get("user:1", "name", CommandFlags::None)
            .await
            .unwrap();
        assert!(missing.is_absent());
    }

    #[tokio::test]
    async fn fire_and_forget_returns_default() {
        let store = MemoryStore::with_shard_count(2);
        let value = store
            .string_increment("hits", 10, CommandFlags::FireAndForget)
            .await
            .unwrap();
        assert_eq!(value, 0);
        assert_eq!(store.incr_by("hits", 0).unwrap(), 10);
    }
}
