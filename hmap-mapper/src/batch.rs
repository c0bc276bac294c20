//! # Batch Coordinator
//!
//! Purpose: Run many mapped operations as one round trip while still
//! returning typed results per operation.
//!
//! ## Design Principles
//! 1. **Build, Then Send**: A caller-supplied closure appends operations to a
//!    builder. Any error raised while building aborts the batch before the
//!    store is touched.
//! 2. **Start All, Flush Once**: Every operation registers its command on one
//!    store batch; the batch is flushed once; replies are then awaited
//!    concurrently.
//! 3. **All Or Nothing**: If any operation fails, the caller gets a
//!    `BatchFailure` and no partial results.
//! 4. **Append Order**: Results come back in the order operations were
//!    appended, whatever order the replies arrive in.
//!
//! ## Flow
//!
//! ```text
//! build(&mut builder) ──> [empty? return]
//!        │
//!        ▼
//! create_batch ──> start each op (spawned) ──> flush
//!        │
//!        ▼
//! join in append order ──> failures? BatchFailure : decode each op
//! ```

use std::time::Duration;

use tokio::task::JoinError;
use tracing::{debug, error};

use hmap_common::{HashStore, MapperError, MapperResult, SetCondition, StoreBatch, StoreError};

use crate::codec::FieldValue;
use crate::descriptor::HashModel;
use crate::entry::CacheEntry;
use crate::operation::{Operation, Pending};
use crate::planner::Planner;

/// Collects write operations for one batch.
pub struct WriteBatch<'a> {
    planner: &'a Planner,
    ops: Vec<Box<dyn Pending>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(planner: &'a Planner) -> Self {
        WriteBatch {
            planner,
            ops: Vec::new(),
        }
    }

    fn push<T: 'static>(&mut self, op: MapperResult<Operation<T>>) -> MapperResult<()> {
        self.ops.push(Box::new(op?));
        Ok(())
    }

    pub fn set<V: FieldValue>(
        &mut self,
        key: &str,
        field: &str,
        value: &V,
        condition: SetCondition,
    ) -> MapperResult<()> {
        let op = self.planner.set(key, field, value, condition);
        self.push(op)
    }

    pub fn set_model<M: HashModel>(&mut self, key: &str, model: &M) -> MapperResult<()> {
        let op = self.planner.set_model(key, model);
        self.push(op)
    }

    /// Writes `values` in iteration order.
    pub fn set_fields<K, V, I>(&mut self, key: &str, values: I) -> MapperResult<()>
    where
        K: AsRef<str>,
        V: FieldValue,
        I: IntoIterator<Item = (K, V)>,
    {
        let op = self.planner.set_fields(key, values);
        self.push(op)
    }

    pub fn delete(&mut self, key: &str) -> MapperResult<()> {
        let op = self.planner.delete(key);
        self.push(op)
    }

    pub fn delete_field(&mut self, key: &str, field: &str) -> MapperResult<()> {
        let op = self.planner.delete_field(key, field);
        self.push(op)
    }

    pub fn increment(&mut self, key: &str, by: i64) -> MapperResult<()> {
        let op = self.planner.increment(key, by);
        self.push(op)
    }

    pub fn increment_field(&mut self, key: &str, field: &str, by: i64) -> MapperResult<()> {
        let op = self.planner.increment_field(key, field, by);
        self.push(op)
    }

    pub fn decrement(&mut self, key: &str, by: i64) -> MapperResult<()> {
        let op = self.planner.decrement(key, by);
        self.push(op)
    }

    pub fn decrement_field(&mut self, key: &str, field: &str, by: i64) -> MapperResult<()> {
        let op = self.planner.decrement_field(key, field, by);
        self.push(op)
    }

    pub fn expire(&mut self, key: &str, ttl: Duration) -> MapperResult<()> {
        let op = self.planner.expire(key, ttl);
        self.push(op)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Collects reads of one model type for one batch.
pub struct ReadBatch<'a, M> {
    planner: &'a Planner,
    ops: Vec<Operation<M>>,
}

impl<'a, M: HashModel> ReadBatch<'a, M> {
    pub(crate) fn new(planner: &'a Planner) -> Self {
        ReadBatch {
            planner,
            ops: Vec::new(),
        }
    }

    /// Queues a read of `fields` (all fields when empty) from `key`.
    pub fn get<F: AsRef<str>>(&mut self, key: &str, fields: &[F]) -> MapperResult<()> {
        self.ops.push(self.planner.get::<M, F>(key, fields)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Builds and runs a write batch.
pub(crate) async fn run_writes<S, B>(store: &S, planner: &Planner, build: B) -> MapperResult<()>
where
    S: HashStore,
    B: FnOnce(&mut WriteBatch<'_>) -> MapperResult<()>,
{
    let mut batch = WriteBatch::new(planner);
    build(&mut batch)?;
    if batch.is_empty() {
        return Ok(());
    }

    let ops: Vec<&dyn Pending> = batch.ops.iter().map(|op| &**op).collect();
    dispatch(store, &ops).await
}

/// Builds and runs a read batch, dropping entries for missing keys.
pub(crate) async fn run_reads<S, M, B>(
    store: &S,
    planner: &Planner,
    build: B,
) -> MapperResult<Vec<CacheEntry<M>>>
where
    S: HashStore,
    M: HashModel,
    B: FnOnce(&mut ReadBatch<'_, M>) -> MapperResult<()>,
{
    let mut batch = ReadBatch::new(planner);
    build(&mut batch)?;
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let ops: Vec<&dyn Pending> = batch.ops.iter().map(|op| op as &dyn Pending).collect();
    dispatch(store, &ops).await?;

    let total = batch.ops.len();
    let mut entries = Vec::with_capacity(total);
    let mut failed = 0;
    let mut first = None;
    for op in &batch.ops {
        match op.result() {
            Ok(entry) if entry.is_null() => {}
            Ok(entry) => entries.push(entry),
            Err(err) => {
                failed += 1;
                first.get_or_insert(err);
            }
        }
    }

    match first {
        None => Ok(entries),
        Some(source) => Err(batch_failure(failed, total, source)),
    }
}

/// Starts every operation on one store batch, flushes it and waits for all
/// replies.
async fn dispatch<S: HashStore>(store: &S, ops: &[&dyn Pending]) -> MapperResult<()> {
    let total = ops.len();
    let batch = store.create_batch();
    let handles: Vec<_> = ops.iter().map(|op| tokio::spawn(op.start(&batch))).collect();

    if let Err(err) = batch.flush().await {
        handles.iter().for_each(|handle| handle.abort());
        return Err(batch_failure(total, total, err.into()));
    }

    let mut failed = 0;
    let mut first = None;
    for (op, handle) in ops.iter().zip(handles) {
        let outcome = handle
            .await
            .map_err(join_failure)
            .and_then(|reply| reply.map_err(MapperError::from));
        match outcome {
            Ok(reply) => {
                op.complete(reply);
                debug!(command = %op.command_text(), "batched");
            }
            Err(err) => {
                failed += 1;
                first.get_or_insert(err);
            }
        }
    }

    match first {
        None => Ok(()),
        Some(source) => Err(batch_failure(failed, total, source)),
    }
}

fn join_failure(err: JoinError) -> MapperError {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    MapperError::Store(StoreError::Closed)
}

fn batch_failure(failed: usize, total: usize, source: MapperError) -> MapperError {
    error!(failed, total, error = %source, "batch failed");
    MapperError::BatchFailure {
        failed,
        total,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmap_common::CommandFlags;
    use hmap_engine::MemoryStore;

    use crate::config::MapperConfig;

    #[derive(Debug, Default, PartialEq)]
    struct User {
        name: String,
        age: i32,
    }

    crate::hash_model!(User { name, age });

    fn planner() -> Planner {
        Planner::new(MapperConfig::default().into_shared(), CommandFlags::None)
    }

    #[tokio::test]
    async fn writes_then_reads_in_append_order() {
        let store = MemoryStore::new();
        let planner = planner();

        run_writes(&store, &planner, |batch| {
            batch.set_model("user:1", &User { name: "Arash".into(), age: 30 })?;
            batch.set("user:2", "name", &"Mina".to_string(), SetCondition::Always)?;
            batch.increment_field("user:2", "age", 7)
        })
        .await
        .unwrap();

        let entries = run_reads(&store, &planner, |batch: &mut ReadBatch<'_, User>| {
            batch.get("user:2", &[] as &[&str])?;
            batch.get("user:3", &["name"])?;
            batch.get("user:1", &["name", "age"])
        })
        .await
        .unwrap();

        let keys: Vec<_> = entries.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, vec!["user:2", "user:1"]);
        assert_eq!(entries[0].value, Some(User { name: "Mina".into(), age: 7 }));
        assert_eq!(entries[1].value, Some(User { name: "Arash".into(), age: 30 }));
    }

    #[tokio::test]
    async fn builder_errors_abort_before_sending() {
        let store = MemoryStore::new();
        let planner = planner();
        let result = run_writes(&store, &planner, |batch| {
            batch.delete("user:1")?;
            batch.delete("")
        })
        .await;
        assert!(matches!(result, Err(MapperError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn one_failed_operation_fails_the_batch() {
        let store = MemoryStore::new();
        store.incr_by("counter", 1).unwrap();
        let planner = planner();

        let result = run_writes(&store, &planner, |batch| {
            batch.increment("counter", 1)?;
            batch.increment_field("counter", "hits", 1)?;
            batch.increment("other", 2)
        })
        .await;

        match result {
            Err(MapperError::BatchFailure { failed, total, .. }) => {
                assert_eq!((failed, total), (1, 3));
            }
            other => panic!("expected batch failure, got {other:?}"),
        }
    }
}
