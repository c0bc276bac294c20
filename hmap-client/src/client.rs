//! # Async Store Client
//!
//! Purpose: Expose the RESP2 connection as a `HashStore`, so the mapper can
//! run single commands and pipelined batches against a Redis-compatible
//! server.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RespStore` hides framing and reply matching.
//! 2. **Eager Dispatch**: Direct commands are queued for the wire as soon as
//!    they are issued, in issue order; the returned future only waits for the
//!    reply.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use hmap_common::{
    CommandFlags, HashCommands, HashStore, SetCondition, StoreFuture, StoreResult, WireScalar,
};

use crate::batch::RespBatch;
use crate::connection::Connection;
use crate::request::{self, Request};

/// Configuration for the async client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional limit on how long a caller waits for a reply.
    pub response_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            connect_timeout: None,
            response_timeout: None,
        }
    }
}

/// Hash store backed by one multiplexed RESP2 connection.
///
/// Cloning is cheap and shares the connection. Commands must be issued from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct RespStore {
    conn: Arc<Connection>,
    config: Arc<ClientConfig>,
}

impl RespStore {
    /// Connects with default configuration.
    pub async fn connect(addr: impl Into<String>) -> StoreResult<Self> {
        let config = ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        };
        Self::with_config(config).await
    }

    /// Connects with a custom configuration.
    pub async fn with_config(config: ClientConfig) -> StoreResult<Self> {
        let conn = Connection::connect(&config.addr, config.connect_timeout).await?;
        Ok(RespStore {
            conn: Arc::new(conn),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn submit<T: Default + Send + 'static>(
        &self,
        request: Request<T>,
        flags: CommandFlags,
    ) -> StoreFuture<T> {
        let (tx, rx) = oneshot::channel();
        let command = request.command;
        let (frame, reply) = request.into_parts(rx, flags, self.config.response_timeout);

        // On failure the slot is dropped, which resolves `reply` with `Closed`.
        if let Err(err) = self.conn.dispatch(frame, vec![tx]) {
            debug!(command, error = %err, "dispatch failed");
        }
        reply
    }
}

impl HashCommands for RespStore {
    fn hash_get(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<WireScalar> {
        self.submit(request::hash_get(key, field), flags)
    }

    fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
        flags: CommandFlags,
    ) -> StoreFuture<Vec<WireScalar>> {
        self.submit(request::hash_get_many(key, fields), flags)
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: WireScalar,
        condition: SetCondition,
        flags: CommandFlags,
    ) -> StoreFuture<bool> {
        self.submit(request::hash_set(key, field, &value, condition), flags)
    }

    fn hash_set_many(
        &self,
        key: &str,
        entries: &[(String, WireScalar)],
        flags: CommandFlags,
    ) -> StoreFuture<()> {
        self.submit(request::hash_set_many(key, entries), flags)
    }

    fn hash_delete(&self, key: &str, field: &str, flags: CommandFlags) -> StoreFuture<bool> {
        self.submit(request::hash_delete(key, field), flags)
    }

    fn key_delete(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        self.submit(request::key_delete(key), flags)
    }

    fn string_increment(&self, key: &str, by: i64, flags: CommandFlags) -> StoreFuture<i64> {
        self.submit(request::string_increment(key, by), flags)
    }

    fn hash_increment(
        &self,
        key: &str,
        field: &str,
        by: i64,
        flags: CommandFlags,
    ) -> StoreFuture<i64> {
        self.submit(request::hash_increment(key, field, by), flags)
    }

    fn key_expire(&self, key: &str, ttl: Duration, flags: CommandFlags) -> StoreFuture<bool> {
        self.submit(request::key_expire(key, ttl), flags)
    }

    fn key_exists(&self, key: &str, flags: CommandFlags) -> StoreFuture<bool> {
        self.submit(request::key_exists(key), flags)
    }
}

impl HashStore for RespStore {
    type Batch = RespBatch;

    fn create_batch(&self) -> RespBatch {
        RespBatch::new(Arc::clone(&self.conn), self.config.response_timeout)
    }
}
