//! # shotsync
//!
//! Client runtime for the ShotSync message protocol.
//!
//! An application registers one message handler; every request and
//! notification that arrives on the connection is dispatched to whichever
//! handler is active at that moment. Registering again supersedes the
//! previous handler, which is released once it has finished any work it
//! already started.
//!
//! ## Architecture
//!
//! - **Registry** ([`HandlerSlot`]): one replaceable handler, safe to swap
//!   from any thread while dispatch is running
//! - **Runtime** ([`Client`]): framed binary protocol over any connected
//!   byte stream, with request/reply correlation
//! - **Global context** ([`client_set_message_handler`]): a process-wide
//!   slot for embedders running a single client
//!
//! ## Example
//!
//! ```ignore
//! use shotsync::{ClientBuilder, HandlerRef, Message, Reply};
//!
//! #[tokio::main]
//! async fn main() -> shotsync::Result<()> {
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:7400").await?;
//!     let client = ClientBuilder::new()
//!         .message_handler(HandlerRef::from_fn(|msg: Message| async move {
//!             Ok(Reply::ok(msg.payload))
//!         }))
//!         .start(stream)
//!         .await?;
//!
//!     client.wait_for_shutdown().await
//! }
//! ```

pub mod codec;
pub mod error;
pub mod global;
pub mod handler;
pub mod protocol;
pub mod stats;

mod client;
mod writer;

pub use client::{
    Client, ClientBuilder, ClientConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_CONCURRENT_DISPATCHES,
};
pub use error::{Result, ShotSyncError};
pub use global::{
    client_clear_message_handler, client_context, client_dispatch, client_message_handler,
    client_set_message_handler,
};
pub use handler::{
    status, DispatchOutcome, Handler, HandlerId, HandlerRef, HandlerSlot, Message, MessageKind,
    RawHandlerFn, Reply,
};
pub use stats::StatsSnapshot;
pub use writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};
