//! # Request Framing
//!
//! Maps each store command onto its RESP2 frame and onto the conversion from
//! the raw reply to the typed result.

use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::oneshot;

use hmap_common::{ready, CommandFlags, SetCondition, StoreError, StoreFuture, StoreResult, WireScalar};

use crate::resp::{encode_command, RespValue};

/// Sets a field only when it already exists. Returns 1 when written.
const SET_IF_PRESENT_SCRIPT: &str = "if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then \
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2]) return 1 else return 0 end";

/// One framed command plus the conversion of its reply.
pub(crate) struct Request<T> {
    pub(crate) frame: BytesMut,
    pub(crate) command: &'static str,
    convert: fn(RespValue) -> Option<T>,
}

impl<T: Default + Send + 'static> Request<T> {
    fn new(command: &'static str, args: &[&[u8]], convert: fn(RespValue) -> Option<T>) -> Self {
        let mut frame = BytesMut::with_capacity(64);
        encode_command(args, &mut frame);
        Request {
            frame,
            command,
            convert,
        }
    }

    /// Builds the caller-facing future waiting on `rx`.
    ///
    /// Fire-and-forget requests resolve to `T::default()` immediately; their
    /// reply is still consumed by the connection and then discarded.
    pub(crate) fn reply(
        command: &'static str,
        convert: fn(RespValue) -> Option<T>,
        rx: oneshot::Receiver<StoreResult<RespValue>>,
        flags: CommandFlags,
        timeout: Option<Duration>,
    ) -> StoreFuture<T> {
        if flags.is_fire_and_forget() {
            return ready(Ok(T::default()));
        }
        Box::pin(async move {
            let received = match timeout {
                Some(limit) => tokio::time::timeout(limit, rx)
                    .await
                    .map_err(|_| StoreError::Timeout)?,
                None => rx.await,
            };
            match received.map_err(|_| StoreError::Closed)?? {
                RespValue::Error(message) => Err(StoreError::Server {
                    message: String::from_utf8_lossy(&message).into_owned(),
                }),
                value => convert(value).ok_or(StoreError::UnexpectedResponse { command }),
            }
        })
    }

    /// Splits the request into its frame and the reply future.
    pub(crate) fn into_parts(
        self,
        rx: oneshot::Receiver<StoreResult<RespValue>>,
        flags: CommandFlags,
        timeout: Option<Duration>,
    ) -> (BytesMut, StoreFuture<T>) {
        let reply = Self::reply(self.command, self.convert, rx, flags, timeout);
        (self.frame, reply)
    }
}

fn bulk(value: RespValue) -> Option<WireScalar> {
    match value {
        RespValue::Bulk(data) => Some(WireScalar::from_bulk(data)),
        _ => None,
    }
}

fn integer(value: RespValue) -> Option<i64> {
    match value {
        RespValue::Integer(value) => Some(value),
        _ => None,
    }
}

fn positive(value: RespValue) -> Option<bool> {
    integer(value).map(|count| count > 0)
}

fn one(value: RespValue) -> Option<bool> {
    integer(value).map(|count| count == 1)
}

pub(crate) fn hash_get(key: &str, field: &str) -> Request<WireScalar> {
    Request::new("HGET", &[b"HGET", key.as_bytes(), field.as_bytes()], bulk)
}

pub(crate) fn hash_get_many(key: &str, fields: &[String]) -> Request<Vec<WireScalar>> {
    let mut args: Vec<&[u8]> = Vec::with_capacity(fields.len() + 2);
    args.push(b"HMGET");
    args.push(key.as_bytes());
    args.extend(fields.iter().map(|field| field.as_bytes()));
    Request::new("HMGET", &args, |value| match value {
        RespValue::Array(items) => items.into_iter().map(bulk).collect(),
        _ => None,
    })
}

pub(crate) fn hash_set(
    key: &str,
    field: &str,
    value: &WireScalar,
    condition: SetCondition,
) -> Request<bool> {
    let value = value.to_bytes();
    match condition {
        SetCondition::Always => Request::new(
            "HSET",
            &[b"HSET", key.as_bytes(), field.as_bytes(), &value],
            positive,
        ),
        SetCondition::IfMissing => Request::new(
            "HSETNX",
            &[b"HSETNX", key.as_bytes(), field.as_bytes(), &value],
            one,
        ),
        SetCondition::IfPresent => Request::new(
            "EVAL",
            &[
                b"EVAL",
                SET_IF_PRESENT_SCRIPT.as_bytes(),
                b"1",
                key.as_bytes(),
                field.as_bytes(),
                &value,
            ],
            one,
        ),
    }
}

pub(crate) fn hash_set_many(key: &str, entries: &[(String, WireScalar)]) -> Request<()> {
    let values: Vec<Vec<u8>> = entries.iter().map(|(_, value)| value.to_bytes()).collect();
    let mut args: Vec<&[u8]> = Vec::with_capacity(entries.len() * 2 + 2);
    args.push(b"HSET");
    args.push(key.as_bytes());
    for ((field, _), value) in entries.iter().zip(&values) {
        args.push(field.as_bytes());
        args.push(value);
    }
    Request::new("HSET", &args, |value| match value {
        RespValue::Integer(_) | RespValue::Simple(_) => Some(()),
        _ => None,
    })
}

pub(crate) fn hash_delete(key: &str, field: &str) -> Request<bool> {
    Request::new("HDEL", &[b"HDEL", key.as_bytes(), field.as_bytes()], positive)
}

pub(crate) fn key_delete(key: &str) -> Request<bool> {
    Request::new("DEL", &[b"DEL", key.as_bytes()], positive)
}

pub(crate) fn key_exists(key: &str) -> Request<bool> {
    Request::new("EXISTS", &[b"EXISTS", key.as_bytes()], positive)
}

pub(crate) fn string_increment(key: &str, by: i64) -> Request<i64> {
    let by = by.to_string();
    Request::new("INCRBY", &[b"INCRBY", key.as_bytes(), by.as_bytes()], integer)
}

pub(crate) fn hash_increment(key: &str, field: &str, by: i64) -> Request<i64> {
    let by = by.to_string();
    Request::new(
        "HINCRBY",
        &[b"HINCRBY", key.as_bytes(), field.as_bytes(), by.as_bytes()],
        integer,
    )
}

pub(crate) fn key_expire(key: &str, ttl: Duration) -> Request<bool> {
    let seconds = expire_seconds(ttl).to_string();
    Request::new("EXPIRE", &[b"EXPIRE", key.as_bytes(), seconds.as_bytes()], one)
}

/// Whole seconds for EXPIRE, rounding partial seconds up.
fn expire_seconds(ttl: Duration) -> u64 {
    let seconds = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        seconds.saturating_add(1)
    } else {
        seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_sets_pick_commands() {
        let value = WireScalar::from("x");
        let always = hash_set("k", "f", &value, SetCondition::Always);
        assert_eq!(always.command, "HSET");
        assert_eq!(&always.frame[..], b"*4\r\n$4\r\nHSET\r\n$1\r\nk\r\n$1\r\nf\r\n$1\r\nx\r\n");

        let missing = hash_set("k", "f", &value, SetCondition::IfMissing);
        assert_eq!(missing.command, "HSETNX");

        let present = hash_set("k", "f", &value, SetCondition::IfPresent);
        assert_eq!(present.command, "EVAL");
        assert!(present.frame.starts_with(b"*6\r\n$4\r\nEVAL\r\n"));
    }

    #[test]
    fn multi_set_interleaves_pairs() {
        let entries = vec![
            ("name".to_string(), WireScalar::from("Arash")),
            ("age".to_string(), WireScalar::Integer(33)),
        ];
        let request = hash_set_many("user:1", &entries);
        let expected: &[u8] = b"*6\r\n$4\r\nHSET\r\n$6\r\nuser:1\r\n$4\r\nname\r\n$5\r\nArash\r\n$3\r\nage\r\n$2\r\n33\r\n";
        assert_eq!(&request.frame[..], expected);
    }

    #[test]
    fn exists_frames_one_key() {
        let request = key_exists("user:1");
        assert_eq!(&request.frame[..], b"*2\r\n$6\r\nEXISTS\r\n$6\r\nuser:1\r\n");
        assert_eq!((request.convert)(RespValue::Integer(1)), Some(true));
        assert_eq!((request.convert)(RespValue::Integer(0)), Some(false));
    }

    #[test]
    fn expire_rounds_up() {
        assert_eq!(expire_seconds(Duration::from_secs(5)), 5);
        assert_eq!(expire_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(expire_seconds(Duration::from_millis(1)), 1);
    }

    #[test]
    fn hmget_reply_keeps_nil_slots() {
        let convert = hash_get_many("k", &["a".to_string(), "b".to_string()]).convert;
        let reply = RespValue::Array(vec![RespValue::Bulk(None), RespValue::Bulk(Some(b"2".to_vec()))]);
        assert_eq!(
            convert(reply),
            Some(vec![WireScalar::Absent, WireScalar::String("2".into())])
        );
        assert_eq!(convert(RespValue::Integer(1)), None);
    }

    #[tokio::test]
    async fn server_errors_surface_as_store_errors() {
        let (tx, rx) = oneshot::channel();
        let reply = Request::<i64>::reply("INCRBY", integer, rx, CommandFlags::None, None);
        tx.send(Ok(RespValue::Error(b"ERR not an integer".to_vec()))).unwrap();
        match reply.await {
            Err(StoreError::Server { message }) => assert_eq!(message, "ERR not an integer"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_slot_reports_closed() {
        let (tx, rx) = oneshot::channel::<StoreResult<RespValue>>();
        let reply = Request::<bool>::reply("DEL", positive, rx, CommandFlags::None, None);
        drop(tx);
        assert!(matches!(reply.await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn fire_and_forget_does_not_wait() {
        let (_tx, rx) = oneshot::channel();
        let reply = Request::<i64>::reply("INCRBY", integer, rx, CommandFlags::FireAndForget, None);
        assert_eq!(reply.await.unwrap(), 0);
    }
}
