//! Handler objects: the callables handed to the registry.
//!
//! A [`HandlerRef`] pairs a process-unique [`HandlerId`] with a shared,
//! reference-counted [`Handler`]. Cloning a `HandlerRef` is cheap and keeps
//! the callable alive; the callable is released when the last clone drops.
//!
//! Three ways to build one:
//! - [`HandlerRef::from_fn`] for an async closure over raw [`Message`]s
//! - [`HandlerRef::typed`] for MsgPack-decoded input and encoded output
//! - [`HandlerRef::from_raw`] for a plain `fn(&Message, &mut Reply) -> i32`,
//!   where `None` stands for a null function pointer
//!
//! # Example
//!
//! ```
//! use shotsync::handler::{HandlerRef, Message, Reply};
//!
//! let handler = HandlerRef::from_fn(|msg: Message| async move {
//!     Ok(Reply::ok(msg.payload))
//! })
//! .with_label("echo");
//!
//! assert!(!handler.is_empty());
//! assert!(HandlerRef::empty().is_empty());
//! ```

use std::fmt;
use std::future::{ready, Future};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::message::{Message, Reply};
use crate::codec::MsgPackCodec;
use crate::error::{Result, ShotSyncError};

/// Result type for handler invocations.
pub type HandlerResult = Result<Reply>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Signature of a synchronous handler function pointer.
///
/// The function fills `reply` and returns 0 on success. Any other return
/// value is a handler failure.
pub type RawHandlerFn = fn(&Message, &mut Reply) -> i32;

/// Trait for handler callables.
pub trait Handler: Send + Sync + 'static {
    /// Handle one message.
    fn call(&self, message: Message) -> BoxFuture<'static, HandlerResult>;
}

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a handler object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Adapter for async closures over raw messages.
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, message: Message) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(message))
    }
}

/// Wrapper that decodes the payload before calling the handler and encodes
/// the value it returns.
pub struct TypedHandler<F, T, R, Fut> {
    handler: F,
    _phantom: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T, Message) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T, Message) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn call(&self, message: Message) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match MsgPackCodec::decode(&message.payload) {
            Ok(v) => v,
            Err(e) => return Box::pin(ready(Err(e))),
        };

        let fut = (self.handler)(parsed, message);
        Box::pin(async move {
            let value = fut.await?;
            Reply::encode(&value)
        })
    }
}

/// Adapter for synchronous function pointers.
pub struct RawHandler {
    f: RawHandlerFn,
}

impl Handler for RawHandler {
    fn call(&self, message: Message) -> BoxFuture<'static, HandlerResult> {
        let mut reply = Reply::empty();
        let rc = (self.f)(&message, &mut reply);
        let result = if rc == 0 {
            Ok(reply)
        } else {
            Err(ShotSyncError::Handler(format!(
                "handler for code {} returned {}",
                message.code, rc
            )))
        };
        Box::pin(ready(result))
    }
}

/// A handler object as passed across the registration boundary.
///
/// Equality is by identity: two refs are equal when they were cloned from
/// the same construction.
#[derive(Clone)]
pub struct HandlerRef {
    id: HandlerId,
    label: Option<Arc<str>>,
    callable: Option<Arc<dyn Handler>>,
}

impl HandlerRef {
    /// Wrap any [`Handler`] implementation.
    pub fn new<H: Handler>(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Wrap an already shared handler. Every call yields a new identity.
    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            id: HandlerId::next(),
            label: None,
            callable: Some(handler),
        }
    }

    /// Build from an async closure over raw messages.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::new(FnHandler { f })
    }

    /// Build from an async closure taking a MsgPack-decoded payload.
    pub fn typed<F, T, R, Fut>(handler: F) -> Self
    where
        F: Fn(T, Message) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self::new(TypedHandler::new(handler))
    }

    /// Build from a function pointer. `None` yields an empty handler.
    pub fn from_raw(f: Option<RawHandlerFn>) -> Self {
        match f {
            Some(f) => Self::new(RawHandler { f }),
            None => Self::empty(),
        }
    }

    /// A handler with no callable. Registration rejects it.
    pub fn empty() -> Self {
        Self {
            id: HandlerId::next(),
            label: None,
            callable: None,
        }
    }

    /// Attach a label used in logs.
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Identity of this handler object.
    #[inline]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Label, if one was attached.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether this ref carries no callable.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.callable.is_none()
    }

    /// Check that the handler can be registered.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ShotSyncError::InvalidHandler(format!(
                "{} has no callable",
                self.id
            )));
        }
        Ok(())
    }

    /// Invoke the handler with a message.
    pub fn invoke(&self, message: Message) -> BoxFuture<'static, HandlerResult> {
        match &self.callable {
            Some(handler) => handler.call(message),
            None => Box::pin(ready(Err(ShotSyncError::InvalidHandler(format!(
                "{} has no callable",
                self.id
            ))))),
        }
    }
}

impl Default for HandlerRef {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for HandlerRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HandlerRef {}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("empty", &self.is_empty())
            .finish()
    }
}
