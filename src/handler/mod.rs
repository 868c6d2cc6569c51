//! Handler module - handler objects, messages, and the registry slot.
//!
//! Provides:
//! - [`HandlerRef`] - a registrable callable with a stable identity
//! - [`HandlerSlot`] - holds the one active handler and dispatches to it
//! - [`Message`] / [`Reply`] - what handlers receive and return
//!
//! # Example
//!
//! ```
//! use shotsync::handler::{HandlerRef, HandlerSlot, Message, Reply};
//!
//! let slot = HandlerSlot::new();
//! slot.set(HandlerRef::from_fn(|msg: Message| async move {
//!     Ok(Reply::ok(msg.payload))
//! }))
//! .unwrap();
//!
//! assert!(slot.is_set());
//! ```

mod message;
mod object;
mod registry;

pub use message::{status, Message, MessageKind, Reply};
pub use object::{
    BoxFuture, FnHandler, Handler, HandlerId, HandlerRef, HandlerResult, RawHandler,
    RawHandlerFn, TypedHandler,
};
pub use registry::{DispatchOutcome, HandlerSlot};
