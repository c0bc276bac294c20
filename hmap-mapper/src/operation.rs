//! # Operation Descriptors
//!
//! Purpose: Describe one store operation independently of when and where it
//! runs.
//!
//! ## Design Principles
//! 1. **Describe, Then Execute**: An `Operation` records its key, command,
//!    fields and values up front. Its pending action can be started against
//!    the store itself or against a batch, any number of times.
//! 2. **Raw Replies, Typed Results**: Stores answer with a `RawReply`; the
//!    operation's decoder turns the stored reply into a `CacheEntry<T>`.
//! 3. **Explicit Readiness**: Asking for the result before a reply has been
//!    recorded is `NotReady`, never a blocking wait.
//!
//! ## Lifecycle
//!
//! ```text
//! build ──> start(store) ──> await ──> complete(reply) ──> result()
//!             │                                   │
//!             └── re-invocable                    └── decoder(key, reply)
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;

use parking_lot::Mutex;
use tracing::{debug, warn};

use hmap_common::{
    CommandKind, HashCommands, MapperError, MapperResult, StoreError, StoreFuture, WireScalar,
};

use crate::codec::ReaderContext;
use crate::config::MapperConfig;
use crate::descriptor::{HashModel, ResolvedFields};
use crate::entry::CacheEntry;

static ABSENT: WireScalar = WireScalar::Absent;

/// Untyped reply of a store command.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReply {
    /// Single field read.
    Scalar(WireScalar),
    /// Multi field read, one scalar per requested field.
    Scalars(Vec<WireScalar>),
    /// Set, delete and expire outcomes.
    Flag(bool),
    /// Counter value after an increment.
    Integer(i64),
    /// Commands without a meaningful reply.
    Unit,
}

pub(crate) type PendingAction =
    Box<dyn Fn(&dyn HashCommands) -> StoreFuture<RawReply> + Send + Sync>;
pub(crate) type ReplyDecoder<T> =
    Box<dyn Fn(&str, &RawReply) -> MapperResult<CacheEntry<T>> + Send + Sync>;

/// Adapts a typed store future into one yielding a `RawReply`.
pub(crate) fn map_reply<T: Send + 'static>(
    future: StoreFuture<T>,
    wrap: fn(T) -> RawReply,
) -> StoreFuture<RawReply> {
    Box::pin(async move { future.await.map(wrap) })
}

/// One described store operation producing a `CacheEntry<T>`.
pub struct Operation<T> {
    key: String,
    kind: CommandKind,
    fields: Vec<String>,
    values: Vec<WireScalar>,
    action: PendingAction,
    decoder: ReplyDecoder<T>,
    reply: Mutex<Option<RawReply>>,
}

impl<T> Operation<T> {
    pub(crate) fn new(
        key: String,
        kind: CommandKind,
        fields: Vec<String>,
        values: Vec<WireScalar>,
        action: PendingAction,
        decoder: ReplyDecoder<T>,
    ) -> Self {
        debug_assert!(fields.is_empty() || values.is_empty() || fields.len() == values.len());
        Operation {
            key,
            kind,
            fields,
            values,
            action,
            decoder,
            reply: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Wire field names, empty for key-level commands.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[WireScalar] {
        &self.values
    }

    /// Registers the command on `store` and returns its reply future.
    ///
    /// Every call issues the command again.
    pub fn start(&self, store: &dyn HashCommands) -> StoreFuture<RawReply> {
        (self.action)(store)
    }

    /// Records the reply the result is decoded from.
    pub fn complete(&self, reply: RawReply) {
        *self.reply.lock() = Some(reply);
    }

    pub fn is_complete(&self) -> bool {
        self.reply.lock().is_some()
    }

    /// Decodes the recorded reply.
    pub fn result(&self) -> MapperResult<CacheEntry<T>> {
        let reply = self.reply.lock();
        let reply = reply.as_ref().ok_or(MapperError::NotReady)?;
        (self.decoder)(&self.key, reply)
    }

    /// Runs the operation directly against `store` and decodes the reply.
    pub async fn execute(&self, store: &dyn HashCommands) -> MapperResult<CacheEntry<T>> {
        let reply = self.start(store).await?;
        self.complete(reply);
        debug!(command = %self.command_text(), "executed");
        self.result()
    }

    /// Human readable form of the command, e.g. `HMGET user:1 name age`.
    pub fn command_text(&self) -> String {
        let mut text = format!("{} {}", self.kind.verb(), self.key);
        if self.fields.len() == self.values.len() {
            for (field, value) in self.fields.iter().zip(&self.values) {
                let _ = write!(text, " {field} {value}");
            }
        } else {
            for field in &self.fields {
                let _ = write!(text, " {field}");
            }
            for value in &self.values {
                let _ = write!(text, " {value}");
            }
        }
        text
    }
}

/// Type-erased view of an operation, used to run heterogeneous batches.
pub(crate) trait Pending: Send + Sync {
    fn start(&self, store: &dyn HashCommands) -> StoreFuture<RawReply>;
    fn complete(&self, reply: RawReply);
    fn command_text(&self) -> String;
}

impl<T> Pending for Operation<T> {
    fn start(&self, store: &dyn HashCommands) -> StoreFuture<RawReply> {
        Operation::start(self, store)
    }

    fn complete(&self, reply: RawReply) {
        Operation::complete(self, reply)
    }

    fn command_text(&self) -> String {
        Operation::command_text(self)
    }
}

fn unexpected(kind: CommandKind) -> MapperError {
    MapperError::Store(StoreError::UnexpectedResponse {
        command: kind.verb(),
    })
}

fn reply_scalars(reply: &RawReply, kind: CommandKind) -> MapperResult<&[WireScalar]> {
    match reply {
        RawReply::Scalar(scalar) => Ok(std::slice::from_ref(scalar)),
        RawReply::Scalars(scalars) => Ok(scalars),
        _ => Err(unexpected(kind)),
    }
}

/// Decoder for set, delete and expire replies.
pub(crate) fn flag_decoder(kind: CommandKind) -> ReplyDecoder<bool> {
    Box::new(move |key: &str, reply: &RawReply| match reply {
        RawReply::Flag(flag) => Ok(CacheEntry::new(key, *flag)),
        RawReply::Unit => Ok(CacheEntry::new(key, true)),
        _ => Err(unexpected(kind)),
    })
}

/// Decoder for increment replies.
pub(crate) fn integer_decoder(kind: CommandKind) -> ReplyDecoder<i64> {
    Box::new(move |key: &str, reply: &RawReply| match reply {
        RawReply::Integer(value) => Ok(CacheEntry::new(key, *value)),
        _ => Err(unexpected(kind)),
    })
}

/// Decoder binding read replies into a model.
pub(crate) fn model_decoder<M: HashModel>(
    kind: CommandKind,
    resolved: ResolvedFields<M>,
    config: std::sync::Arc<MapperConfig>,
) -> ReplyDecoder<M> {
    Box::new(move |key: &str, reply: &RawReply| {
        let scalars = reply_scalars(reply, kind)?;
        if scalars.iter().all(WireScalar::is_absent) {
            return Ok(CacheEntry::null(key));
        }

        let ctx = ReaderContext::new(&config);
        let mut model = M::default();
        let mut missed = Vec::new();
        for (idx, field) in resolved.iter().enumerate() {
            let scalar = scalars.get(idx).unwrap_or(&ABSENT);
            if scalar.is_absent() {
                missed.push(field.wire_name().to_string());
                continue;
            }
            if let Err(err) = field.decode_into(&mut model, scalar, &ctx) {
                warn!(key, field = field.wire_name(), error = %err, "field decode failed");
                missed.push(field.wire_name().to_string());
            }
        }

        Ok(CacheEntry::new(key, model).with_missed_fields(missed))
    })
}

/// Decoder collecting read replies into a `field -> scalar` map.
pub(crate) fn raw_decoder(
    kind: CommandKind,
    fields: Vec<String>,
) -> ReplyDecoder<HashMap<String, WireScalar>> {
    Box::new(move |key: &str, reply: &RawReply| {
        let scalars = reply_scalars(reply, kind)?;
        if scalars.iter().all(WireScalar::is_absent) {
            return Ok(CacheEntry::null(key));
        }

        let mut values = HashMap::with_capacity(fields.len());
        let mut missed = Vec::new();
        for (idx, field) in fields.iter().enumerate() {
            match scalars.get(idx).unwrap_or(&ABSENT) {
                WireScalar::Absent => missed.push(field.clone()),
                scalar => {
                    values.insert(field.clone(), scalar.clone());
                }
            }
        }

        Ok(CacheEntry::new(key, values).with_missed_fields(missed))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmap_common::{ready, CommandFlags};
    use hmap_engine::MemoryStore;

    fn get_name() -> Operation<bool> {
        let action: PendingAction = Box::new(|store: &dyn HashCommands| {
            map_reply(
                store.hash_get("user:1", "name", CommandFlags::None),
                |scalar| RawReply::Flag(!scalar.is_absent()),
            )
        });
        Operation::new(
            "user:1".into(),
            CommandKind::Get,
            vec!["name".into()],
            Vec::new(),
            action,
            flag_decoder(CommandKind::Get),
        )
    }

    #[test]
    fn result_before_completion_is_not_ready() {
        let op = get_name();
        assert!(matches!(op.result(), Err(MapperError::NotReady)));
        op.complete(RawReply::Flag(true));
        assert_eq!(op.result().unwrap().value, Some(true));
    }

    #[test]
    fn unexpected_reply_shape_is_reported() {
        let op = get_name();
        op.complete(RawReply::Integer(3));
        assert!(matches!(
            op.result(),
            Err(MapperError::Store(StoreError::UnexpectedResponse { command: "HGET" }))
        ));
    }

    #[tokio::test]
    async fn actions_can_be_started_again() {
        let store = MemoryStore::new();
        let op = get_name();
        assert_eq!(op.start(&store).await.unwrap(), RawReply::Flag(false));

        store
            .hset("user:1", "name", "Arash".into(), Default::default())
            .unwrap();
        assert_eq!(op.execute(&store).await.unwrap().value, Some(true));
    }

    #[test]
    fn command_text_interleaves_pairs() {
        let op = Operation::<bool>::new(
            "user:1".into(),
            CommandKind::MSet,
            vec!["name".into(), "age".into()],
            vec![WireScalar::from("Arash"), WireScalar::Integer(30)],
            Box::new(|_: &dyn HashCommands| ready(Ok(RawReply::Unit))),
            flag_decoder(CommandKind::MSet),
        );
        assert_eq!(op.command_text(), "HMSET user:1 name Arash age 30");

        let expire = Operation::<bool>::new(
            "user:1".into(),
            CommandKind::Expire,
            Vec::new(),
            vec![WireScalar::Integer(60)],
            Box::new(|_: &dyn HashCommands| ready(Ok(RawReply::Flag(true)))),
            flag_decoder(CommandKind::Expire),
        );
        assert_eq!(expire.command_text(), "EXPIRE user:1 60");
    }

    #[test]
    fn raw_reads_list_missing_fields() {
        let decoder = raw_decoder(CommandKind::MGet, vec!["name".into(), "age".into()]);
        let reply = RawReply::Scalars(vec![WireScalar::from("Arash"), WireScalar::Absent]);
        let entry = decoder("user:1", &reply).unwrap();
        assert_eq!(entry.missed_fields, vec!["age".to_string()]);
        assert_eq!(
            entry.value.unwrap().get("name"),
            Some(&WireScalar::from("Arash"))
        );

        let all_absent = RawReply::Scalars(vec![WireScalar::Absent, WireScalar::Absent]);
        assert!(decoder("user:1", &all_absent).unwrap().is_null());
    }
}
