//! # HashMapper RESP Client
//!
//! Purpose: Provide an async Redis-compatible transport implementing the
//! hash store interface, with batches pipelined into a single write.
//!
//! ## Design Principles
//! 1. **One Multiplexed Connection**: Requests share a TCP stream; replies are
//!    matched to requests in FIFO order by a background reader task.
//! 2. **Pipelining**: A batch encodes all queued commands into one buffer.
//! 3. **Minimal Allocation**: Commands are framed straight into `BytesMut`.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod batch;
mod client;
mod connection;
mod request;
mod resp;

pub use batch::RespBatch;
pub use client::{ClientConfig, RespStore};
pub use resp::{decode_frame, encode_command, RespValue};
