//! # Pipelined Batch
//!
//! Commands issued on a `RespBatch` are framed into a shared buffer and get a
//! reply slot right away. `flush` writes the whole buffer in one call; the
//! reader task then completes the slots in order.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use hmap_common::{
    ready, CommandFlags, HashCommands, SetCondition, StoreBatch, StoreFuture, WireScalar,
};

use crate::connection::{Connection, ReplySlot};
use crate::request::{self, Request};

#[derive(Default)]
struct Queued {
    frames: BytesMut,
    slots: Vec<ReplySlot>,
}

/// A pipeline of commands sent in one write on `flush`.
pub struct RespBatch {
    conn: Arc<Connection>,
    response_timeout: Option<Duration>,
    queued: Mutex<Queued>,
}

impl RespBatch {
    pub(crate) fn new(conn: Arc<Connection>, response_timeout: Option<Duration>) -> Self {
        RespBatch {
            conn,
            response_timeout,
            queued: Mutex::new(Queued::default()),
        }
    }

    /// Number of commands waiting for `flush`.
    pub fn len(&self) -> usize {
        self.queued.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn queue<T: Default + Send + 'static>(
        &self,
        request: Request<T>,
        flags: CommandFlags,
    ) -> StoreFuture<T> {
        let (tx, rx) = oneshot::channel();
        let (frame, reply) = request.into_parts(rx, flags, self.response_timeout);
        let mut queued = self.queued.lock();
        queued.frames.extend_from_slice(&frame);
        queued.slots.push(tx);
        reply
    }
}

impl HashCommands for RespBatch {
    fn hash_get(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<WireScalar> {
        self.queue(request::hash_get(key, field), flags)
    }

    fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
        flags: CommandFlags,
    ) -> StoreFuture<Vec<WireScalar>> {
        self.queue(request::hash_get_many(key, fields), flags)
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: WireScalar,
        condition: SetCondition,
        flags: CommandFlags,
    ) -> StoreFuture<bool> {
        self.queue(request::hash_set(key, field, &value, condition), flags)
    }

    fn hash_set_many(
        &self,
        key: &str,
        entries: &[(String, WireScalar)],
        flags: CommandFlags,
    ) -> StoreFuture<()> {
        self.queue(request::hash_set_many(key, entries), flags)
    }

    fn hash_delete(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<bool> {
        self.queue(request::hash_delete(key, field), flags)
    }

    fn key_delete(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        self.queue(request::key_delete(key), flags)
    }

    fn string_increment(&self, key: &str, by: i64, flags: CommandFlags) -> StoreFuture<i64> {
        self.queue(request::string_increment(key, by), flags)
    }

    fn hash_increment(
        &self,
        key: &str,
        field: &str,
        by: i64,
        flags: CommandFlags,
    ) -> StoreFuture<i64> {
        self.queue(request::hash_increment(key, field, by), flags)
    }

    fn key_expire(&self, key: &str, ttl: Duration, flags: CommandFlags) -> StoreFuture<bool> {
        self.queue(request::key_expire(key, ttl), flags)
    }

    fn key_exists(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        self.queue(request::key_exists(key), flags)
    }
}

impl StoreBatch for RespBatch {
    fn flush(&self) -> StoreFuture<()> {
        let Queued { frames, slots } = std::mem::take(&mut *self.queued.lock());
        if slots.is_empty() {
            return ready(Ok(()));
        }
        trace!(commands = slots.len(), bytes = frames.len(), "flushing pipeline");
        ready(self.conn.dispatch(frames, slots))
    }
}
