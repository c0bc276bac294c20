//! # Multiplexed Connection
//!
//! Purpose: Share one TCP stream between every request of a client.
//!
//! ## Design Principles
//! 1. **Ordered Outbox**: Reply slots are registered and frames are queued
//!    for the writer task under one lock, so slot order equals wire order
//!    equals issue order.
//! 2. **FIFO Replies**: A background reader task parses frames and completes
//!    slots front to back.
//! 3. **Fail Everyone**: When the stream breaks, every waiting slot receives
//!    the same error and later dispatches fail with `Closed`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use hmap_common::{StoreError, StoreResult};

use crate::resp::{decode_frame, RespValue};

/// Completion handle for one in-flight command.
pub(crate) type ReplySlot = oneshot::Sender<StoreResult<RespValue>>;

#[derive(Default)]
struct PendingQueue {
    slots: VecDeque<ReplySlot>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<PendingQueue>,
}

impl Shared {
    /// Completes the oldest waiting slot. Returns false on an unsolicited reply.
    fn complete(&self, value: RespValue) -> bool {
        let slot = self.pending.lock().slots.pop_front();
        match slot {
            Some(slot) => {
                // A dropped receiver means the caller did not wait for the reply.
                let _ = slot.send(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Marks the connection closed and fails every waiting slot.
    fn fail_all(&self, err: StoreError) {
        let slots = {
            let mut pending = self.pending.lock();
            pending.closed = true;
            std::mem::take(&mut pending.slots)
        };
        for slot in slots {
            let _ = slot.send(Err(err.clone()));
        }
    }
}

/// One TCP stream driven by a background writer task and a background
/// reader task.
pub(crate) struct Connection {
    outbox: mpsc::UnboundedSender<BytesMut>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Connects to `addr` and starts the reader task.
    pub(crate) async fn connect(addr: &str, connect_timeout: Option<Duration>) -> StoreResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| StoreError::InvalidAddress(addr.to_string()))?;
        let stream = match connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| StoreError::Timeout)??,
            None => TcpStream::connect(addr).await?,
        };
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");

        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&shared)));
        let (outbox, queued) = mpsc::unbounded_channel();
        // Ends on its own once the connection drops the outbox.
        tokio::spawn(write_loop(write_half, queued, Arc::clone(&shared)));

        Ok(Connection {
            outbox,
            shared,
            reader,
        })
    }

    /// Registers `slots` and queues `frames` for the writer task.
    ///
    /// `frames` must hold exactly one encoded command per slot, in order.
    /// Commands reach the wire in the order they are dispatched; write
    /// failures are reported through the slots.
    pub(crate) fn dispatch(&self, frames: BytesMut, slots: Vec<ReplySlot>) -> StoreResult<()> {
        let mut pending = self.shared.pending.lock();
        if pending.closed {
            return Err(StoreError::Closed);
        }
        self.outbox.send(frames).map_err(|_| StoreError::Closed)?;
        pending.slots.extend(slots);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queued: mpsc::UnboundedReceiver<BytesMut>,
    shared: Arc<Shared>,
) {
    while let Some(frames) = queued.recv().await {
        let written = async {
            writer.write_all(&frames).await?;
            writer.flush().await
        }
        .await;
        if let Err(err) = written {
            let err = StoreError::from(err);
            warn!(error = %err, "write failed, closing connection");
            shared.fail_all(err);
            return;
        }
    }
}

async fn read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    let mut buf = BytesMut::with_capacity(4096);
    let err = loop {
        match drain_frames(&mut buf, &shared) {
            Ok(()) => {}
            Err(err) => break err,
        }
        match reader.read_buf(&mut buf).await {
            Ok(0) => break StoreError::Closed,
            Ok(_) => {}
            Err(err) => break StoreError::from(err),
        }
    };
    debug!(error = %err, "reader stopped");
    shared.fail_all(err);
}

fn drain_frames(buf: &mut BytesMut, shared: &Shared) -> StoreResult<()> {
    while let Some((value, used)) = decode_frame(buf)? {
        buf.advance(used);
        if !shared.complete(value) {
            return Err(StoreError::Protocol);
        }
    }
    Ok(())
}
