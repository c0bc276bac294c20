//! # RESP2 Encoding and Parsing
//!
//! Purpose: Frame client commands and parse server replies incrementally from
//! a growing read buffer.
//!
//! ## Design Principles
//! 1. **Incremental Parsing**: `decode_frame` returns `None` until a complete
//!    frame is buffered, so the reader task never blocks mid-frame.
//! 2. **Buffer Reuse**: Commands are appended to a caller-provided buffer,
//!    which lets a batch frame many commands into one write.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use bytes::{BufMut, BytesMut};

use hmap_common::{StoreError, StoreResult};

/// RESP response value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK style responses.
    Simple(Vec<u8>),
    /// -ERR ... responses.
    Error(Vec<u8>),
    /// :123 responses.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays (HMGET replies).
    Array(Vec<RespValue>),
}

/// Appends a RESP2 array command to `out`.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A], out: &mut BytesMut) {
    out.put_u8(b'*');
    push_usize(out, args.len());
    out.put_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        out.put_u8(b'$');
        push_usize(out, arg.len());
        out.put_slice(b"\r\n");
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

/// Parses one RESP value from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied, or `None` when the
/// buffer does not yet hold a complete frame.
pub fn decode_frame(buf: &[u8]) -> StoreResult<Option<(RespValue, usize)>> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    if line_end == 0 {
        return Err(StoreError::Protocol);
    }
    let line = &buf[1..line_end];
    let after = line_end + 2;

    match buf[0] {
        b'+' => Ok(Some((RespValue::Simple(line.to_vec()), after))),
        b'-' => Ok(Some((RespValue::Error(line.to_vec()), after))),
        b':' => Ok(Some((RespValue::Integer(parse_i64(line)?), after))),
        b'$' => {
            let len = parse_i64(line)?;
            if len < 0 {
                return Ok(Some((RespValue::Bulk(None), after)));
            }
            let end = usize::try_from(len)
                .ok()
                .and_then(|len| after.checked_add(len))
                .filter(|end| end.checked_add(2).is_some())
                .ok_or(StoreError::Protocol)?;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(StoreError::Protocol);
            }
            Ok(Some((RespValue::Bulk(Some(buf[after..end].to_vec())), end + 2)))
        }
        b'*' => {
            let len = parse_i64(line)?;
            if len <= 0 {
                return Ok(Some((RespValue::Array(Vec::new()), after)));
            }

            let count = usize::try_from(len).map_err(|_| StoreError::Protocol)?;
            // Every element takes at least one byte of the remaining input.
            let mut items = Vec::with_capacity(count.min(buf.len() - after));
            let mut offset = after;
            for _ in 0..len {
                match decode_frame(&buf[offset..])? {
                    Some((item, used)) => {
                        items.push(item);
                        offset += used;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(items), offset)))
        }
        _ => Err(StoreError::Protocol),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

fn parse_i64(data: &[u8]) -> StoreResult<i64> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, data),
        None => return Err(StoreError::Protocol),
    };
    if digits.is_empty() {
        return Err(StoreError::Protocol);
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(StoreError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }

    Ok(if negative { -value } else { value })
}

fn push_usize(out: &mut BytesMut, mut value: usize) {
    // Digits are written into a stack buffer, then copied in order.
    let mut buf = [0u8; 20];
    let mut len = 0;
    loop {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
        if value == 0 {
            break;
        }
    }
    buf[..len].reverse();
    out.put_slice(&buf[..len]);
}
