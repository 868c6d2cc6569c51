//! Dedicated writer task for outbound frames.
//!
//! Requests, notifications, and handler replies are produced by many tasks
//! at once. Instead of sharing the write half behind a lock, every producer
//! holds a cloneable [`WriterHandle`] feeding an mpsc channel, and one task
//! owns the stream:
//!
//! ```text
//! call()    ─┐
//! notify()  ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► stream
//! dispatch  ─┘
//! ```
//!
//! Frames that are already queued when the task wakes up are coalesced into
//! a single write.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Result, ShotSyncError};
use crate::protocol::{Header, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to coalesce in a single write.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header.
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    #[inline]
    pub fn new(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
        }
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame, waiting for channel capacity.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ShotSyncError::ConnectionClosed)
    }

    /// Whether the writer task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends when every handle is dropped or `stop` flips to `true`.
/// Frames already queued at that point are written, then the stream is shut
/// down so the peer sees end-of-stream.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    stop: watch::Receiver<bool>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer, stop));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    mut stop: watch::Receiver<bool>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BytesMut::new();

    loop {
        if *stop.borrow() {
            break;
        }

        let first = tokio::select! {
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => break,
            },
            _ = stop.changed() => break,
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        encode_batch(&mut out, &batch);
        writer.write_all(&out).await?;
        writer.flush().await?;
        out.clear();
    }

    // Frames queued before the stop still go out.
    let mut rest = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        rest.push(frame);
    }
    if !rest.is_empty() {
        tracing::debug!(count = rest.len(), "flushing queued frames before stop");
        encode_batch(&mut out, &rest);
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    tracing::debug!("writer task stopping");
    writer.shutdown().await?;
    Ok(())
}

fn encode_batch(out: &mut BytesMut, batch: &[OutboundFrame]) {
    let total: usize = batch.iter().map(OutboundFrame::size).sum();
    out.reserve(total);
    for frame in batch {
        out.put_slice(&frame.header);
        out.put_slice(&frame.payload);
    }
}
