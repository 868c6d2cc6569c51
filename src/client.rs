//! Client builder and runtime loop.
//!
//! The [`ClientBuilder`] collects configuration and an optional initial
//! message handler. [`ClientBuilder::start`] takes an already connected
//! stream and runs the client over it:
//! 1. Split the stream into read and write halves
//! 2. Spawn the writer task
//! 3. Spawn the read loop, which routes every incoming frame:
//!    requests and notifications go to the registered handler, replies
//!    complete the matching [`Client::call`] and are then shown to the
//!    handler too
//!
//! The handler can be swapped at any time with
//! [`Client::set_message_handler`]; frames already being handled finish on
//! the handler they started with.
//!
//! # Example
//!
//! ```ignore
//! use shotsync::{Client, HandlerRef, Message, Reply};
//!
//! let (a, b) = tokio::io::duplex(64 * 1024);
//!
//! let server = Client::builder()
//!     .message_handler(HandlerRef::from_fn(|msg: Message| async move {
//!         Ok(Reply::ok(msg.payload))
//!     }))
//!     .start(a)
//!     .await?;
//! let client = Client::builder().start(b).await?;
//!
//! let reply = client.call(1, &b"ping"[..]).await?;
//! assert_eq!(&reply.payload[..], b"ping");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::JoinHandle;

use crate::codec::MsgPackCodec;
use crate::error::{Result, ShotSyncError};
use crate::handler::{
    status, DispatchOutcome, HandlerId, HandlerRef, HandlerSlot, Message, Reply,
};
use crate::protocol::{
    decode_reply_payload, encode_reply_payload, flags, Frame, FrameBuffer, Header,
    DEFAULT_MAX_PAYLOAD_SIZE, RESERVED_CODE,
};
use crate::stats::StatsSnapshot;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default time a call waits for its reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum concurrent handler invocations.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 256;

/// Read buffer size for the read loop.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long [`Client::call`] waits for a reply.
    pub call_timeout: Duration,
    /// Largest payload accepted or sent.
    pub max_payload_size: u32,
    /// Upper bound on handler invocations in flight.
    pub max_concurrent_dispatches: usize,
    /// Writer task settings.
    pub writer: WriterConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
            writer: WriterConfig::default(),
        }
    }
}

/// Builder for configuring and starting a client.
pub struct ClientBuilder {
    config: ClientConfig,
    slot: Option<Arc<HandlerSlot>>,
    handler: Option<HandlerRef>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            slot: None,
            handler: None,
        }
    }

    /// Register this handler when the client starts.
    pub fn message_handler(mut self, handler: HandlerRef) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Dispatch through an existing slot instead of a private one.
    ///
    /// Lets several clients, or the process-wide context from
    /// [`crate::global`], share one registration.
    pub fn handler_slot(mut self, slot: Arc<HandlerSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Set how long calls wait for their reply.
    ///
    /// Default: 5 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Set the largest payload accepted or sent.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, limit: u32) -> Self {
        self.config.max_payload_size = limit;
        self
    }

    /// Set the maximum number of concurrent handler invocations.
    ///
    /// When this limit is reached, new messages are discarded with a warning.
    /// Default: 256
    pub fn max_concurrent_dispatches(mut self, limit: usize) -> Self {
        self.config.max_concurrent_dispatches = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Start the client over a connected stream.
    ///
    /// Fails with [`ShotSyncError::InvalidHandler`] if an empty handler was
    /// given to [`ClientBuilder::message_handler`]; nothing is spawned then.
    pub async fn start<S>(self, stream: S) -> Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let slot = self.slot.unwrap_or_default();
        if let Some(handler) = self.handler {
            slot.set(handler)?;
        }
        Client::start(stream, slot, self.config).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct PendingTable {
    calls: HashMap<u32, oneshot::Sender<Reply>>,
    closed: bool,
}

/// Calls waiting for their reply, keyed by request id.
struct PendingCalls {
    next_id: AtomicU32,
    table: Mutex<PendingTable>,
}

impl PendingCalls {
    fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            table: Mutex::new(PendingTable::default()),
        }
    }

    /// Reserve a fresh request id. Ids wrap around, skipping 0 and ids
    /// still waiting. Fails once the table has been closed.
    fn register(&self) -> Result<(u32, oneshot::Receiver<Reply>)> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.table.lock();
        if table.closed {
            return Err(ShotSyncError::ConnectionClosed);
        }
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 || table.calls.contains_key(&id) {
                continue;
            }
            table.calls.insert(id, tx);
            return Ok((id, rx));
        }
    }

    fn complete(&self, request_id: u32, reply: Reply) -> bool {
        let sender = self.table.lock().calls.remove(&request_id);
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    fn cancel(&self, request_id: u32) {
        self.table.lock().calls.remove(&request_id);
    }

    /// Close the table and drop every waiter; their calls fail with
    /// `ConnectionClosed`.
    fn fail_all(&self) {
        let drained: Vec<_> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.calls.drain().collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "failing pending calls");
        }
    }

    fn len(&self) -> usize {
        self.table.lock().calls.len()
    }
}

/// State shared by the client handle and its tasks.
struct Inner {
    slot: Arc<HandlerSlot>,
    writer: WriterHandle,
    pending: PendingCalls,
    config: ClientConfig,
    stop: watch::Sender<bool>,
    closed: watch::Sender<bool>,
}

impl Inner {
    fn is_closed(&self) -> bool {
        *self.closed.borrow() || *self.stop.borrow() || self.writer.is_closed()
    }
}

/// A running client.
///
/// Dropping the client stops its tasks.
pub struct Client {
    inner: Arc<Inner>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    async fn start<S>(stream: S, slot: Arc<HandlerSlot>, config: ClientConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);

        let (stop, stop_rx) = watch::channel(false);
        let (closed, _) = watch::channel(false);

        let (writer, writer_task) =
            spawn_writer_task(write_half, config.writer.clone(), stop_rx.clone());

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_dispatches));
        let inner = Arc::new(Inner {
            slot,
            writer,
            pending: PendingCalls::new(),
            config,
            stop,
            closed,
        });

        let loop_inner = inner.clone();
        let read_task = tokio::spawn(async move {
            match Self::read_loop(reader, loop_inner.clone(), semaphore, stop_rx).await {
                Ok(()) => tracing::debug!("read loop finished"),
                Err(e) => tracing::error!("Read loop error: {}", e),
            }
            loop_inner.stop.send_replace(true);
            loop_inner.pending.fail_all();
            loop_inner.closed.send_replace(true);
        });

        tracing::debug!(
            handler = ?inner.slot.active_id(),
            "client started"
        );

        Ok(Client {
            inner,
            read_task: Mutex::new(Some(read_task)),
            _writer_task: writer_task,
        })
    }

    /// Main read loop - reads frames and routes them.
    async fn read_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        inner: Arc<Inner>,
        semaphore: Arc<Semaphore>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut frame_buffer = FrameBuffer::with_max_payload(inner.config.max_payload_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            if *stop.borrow() {
                return Ok(());
            }

            let n = tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => return Ok(()),
                    Ok(n) => n,
                    Err(e) => return Err(ShotSyncError::Io(e)),
                },
                _ = stop.changed() => return Ok(()),
            };

            for frame in frame_buffer.push(&buf[..n])? {
                Self::route_frame(frame, &inner, &semaphore).await;
            }
        }
    }

    /// Route one incoming frame.
    async fn route_frame(frame: Frame, inner: &Arc<Inner>, semaphore: &Arc<Semaphore>) {
        let header = frame.header;

        let message = if header.is_reply() {
            let (status, body) = match decode_reply_payload(&frame.payload) {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::warn!(request_id = header.request_id, "dropping bad reply: {}", e);
                    return;
                }
            };
            let reply = Reply::with_status(status, body.clone());
            if inner.pending.complete(header.request_id, reply) {
                // A completed call is not a discard when nobody observes replies.
                if !inner.slot.is_set() {
                    tracing::debug!(
                        code = header.code,
                        request_id = header.request_id,
                        "reply delivered to caller"
                    );
                    return;
                }
            } else {
                tracing::warn!(
                    code = header.code,
                    request_id = header.request_id,
                    "Received reply for unknown request"
                );
            }
            Message::reply(header.code, header.request_id, status, body)
        } else if header.is_notification() {
            Message::notification(header.code, frame.payload)
        } else {
            Message::request(header.code, header.request_id, frame.payload)
        };

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                inner
                    .slot
                    .record_discard(&message, "dispatch capacity reached");
                if message.expects_reply() {
                    let reply = Reply::with_status(status::BUSY, Bytes::new());
                    Self::write_reply(inner, message.code, message.request_id, reply).await;
                }
                return;
            }
        };

        let inner = inner.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let expects_reply = message.expects_reply();
            let code = message.code;
            let request_id = message.request_id;

            let reply = match inner.slot.dispatch(message).await {
                DispatchOutcome::Handled { reply, .. } => reply,
                DispatchOutcome::Failed { error, .. } => {
                    Reply::with_status(status::HANDLER_FAILED, error.to_string())
                }
                DispatchOutcome::Discarded => Reply::with_status(status::UNHANDLED, Bytes::new()),
            };

            if expects_reply {
                Self::write_reply(&inner, code, request_id, reply).await;
            }
        });
    }

    async fn write_reply(inner: &Arc<Inner>, code: u16, request_id: u32, reply: Reply) {
        let reply = fit_reply(reply, inner.config.max_payload_size as usize);
        let frame_flags = if reply.is_ok() {
            flags::REPLY
        } else {
            flags::ERROR_REPLY
        };
        let payload = encode_reply_payload(reply.status, &reply.payload);
        let header = Header::new(code, frame_flags, request_id, payload.len() as u32);

        if let Err(e) = inner.writer.send(OutboundFrame::new(&header, payload)).await {
            tracing::warn!(code, request_id, "could not send reply: {}", e);
        }
    }

    fn check_outbound(&self, code: u16, payload_len: usize) -> Result<()> {
        if self.inner.is_closed() {
            return Err(ShotSyncError::ConnectionClosed);
        }
        if code == RESERVED_CODE {
            return Err(ShotSyncError::Protocol("Code 0 is reserved".to_string()));
        }
        if payload_len > self.inner.config.max_payload_size as usize {
            return Err(ShotSyncError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload_len, self.inner.config.max_payload_size
            )));
        }
        Ok(())
    }

    /// Install a new message handler, superseding the active one.
    ///
    /// An empty handler fails with [`ShotSyncError::InvalidHandler`] and
    /// leaves the active handler in place.
    pub fn set_message_handler(&self, handler: HandlerRef) -> Result<()> {
        self.inner.slot.set(handler).map(|_| ())
    }

    /// Id of the active message handler.
    pub fn message_handler(&self) -> Option<HandlerId> {
        self.inner.slot.active_id()
    }

    /// Remove the active message handler.
    pub fn clear_message_handler(&self) -> Option<HandlerId> {
        self.inner.slot.clear()
    }

    /// The slot this client dispatches through.
    pub fn handler_slot(&self) -> &Arc<HandlerSlot> {
        &self.inner.slot
    }

    /// Send a request and wait for its reply.
    ///
    /// A reply with a non-zero status is still returned as `Ok`; inspect
    /// [`Reply::status`].
    pub async fn call(&self, code: u16, payload: impl Into<Bytes>) -> Result<Reply> {
        let payload = payload.into();
        self.check_outbound(code, payload.len())?;

        let (request_id, rx) = self.inner.pending.register()?;
        let header = Header::new(code, flags::REQUEST, request_id, payload.len() as u32);

        if let Err(e) = self
            .inner
            .writer
            .send(OutboundFrame::new(&header, payload))
            .await
        {
            self.inner.pending.cancel(request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.inner.config.call_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ShotSyncError::ConnectionClosed),
            Err(_) => {
                self.inner.pending.cancel(request_id);
                tracing::debug!(code, request_id, "call timed out");
                Err(ShotSyncError::Timeout)
            }
        }
    }

    /// MsgPack convenience over [`Client::call`].
    ///
    /// A non-zero reply status becomes [`ShotSyncError::RemoteStatus`].
    pub async fn call_typed<T, R>(&self, code: u16, value: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let payload = MsgPackCodec::encode(value)?;
        let reply = self.call(code, payload).await?;
        if !reply.is_ok() {
            return Err(ShotSyncError::RemoteStatus(reply.status));
        }
        reply.decode()
    }

    /// Send a notification (no reply expected).
    pub async fn notify(&self, code: u16, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        self.check_outbound(code, payload.len())?;

        let header = Header::new(code, flags::NO_REPLY, 0, payload.len() as u32);
        self.inner
            .writer
            .send(OutboundFrame::new(&header, payload))
            .await
    }

    /// Number of calls waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Dispatch counters for this client's slot.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.slot.stats()
    }

    /// Whether the read loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Stop the client and wait for the read loop to exit.
    ///
    /// Pending calls fail with [`ShotSyncError::ConnectionClosed`]. Calling
    /// this more than once is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.stop.send_replace(true);
        let task = self.read_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("read loop task failed: {}", e);
            }
        }
        Ok(())
    }

    /// Wait until the peer closes the stream or the client is shut down.
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        let mut closed = self.inner.closed.subscribe();
        let _ = closed.wait_for(|c| *c).await;
        Ok(())
    }
}

/// Keep a reply body within the payload limit.
///
/// An oversized body is replaced by a `HANDLER_FAILED` reply whose text is
/// cut to the limit, so the peer never receives a frame it must reject.
fn fit_reply(reply: Reply, max_payload_size: usize) -> Reply {
    if reply.payload.len() <= max_payload_size {
        return reply;
    }
    tracing::warn!(
        status = reply.status,
        len = reply.payload.len(),
        max_payload_size,
        "reply body exceeds payload limit"
    );
    let mut text = format!(
        "reply body of {} bytes exceeds limit of {}",
        reply.payload.len(),
        max_payload_size
    )
    .into_bytes();
    text.truncate(max_payload_size);
    Reply::with_status(status::HANDLER_FAILED, text)
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.stop.send_replace(true);
    }
}
