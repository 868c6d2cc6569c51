//! Messages delivered to handlers and the replies they produce.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// Reply status codes.
///
/// Zero is success. Applications may use any other positive or negative
/// value; the negatives below are produced by the runtime itself.
pub mod status {
    /// Handler succeeded.
    pub const OK: i32 = 0;
    /// Handler returned an error.
    pub const HANDLER_FAILED: i32 = -1;
    /// No handler was registered; the request was discarded.
    pub const UNHANDLED: i32 = -2;
    /// Dispatch capacity was exhausted; the request was discarded.
    pub const BUSY: i32 = -3;
}

/// What a message is, from the receiver's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// The peer waits for a reply.
    Request,
    /// Fire-and-forget, no reply is sent.
    Notification,
    /// Answer to a call this side issued.
    Reply {
        /// Status reported by the remote handler.
        status: i32,
    },
}

/// A message handed to the registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Kind of message.
    pub kind: MessageKind,
    /// Application message code.
    pub code: u16,
    /// Request identifier (0 for notifications).
    pub request_id: u32,
    /// Opaque payload.
    pub payload: Bytes,
}

impl Message {
    /// Build a request message.
    pub fn request(code: u16, request_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Request,
            code,
            request_id,
            payload: payload.into(),
        }
    }

    /// Build a notification message.
    pub fn notification(code: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Notification,
            code,
            request_id: 0,
            payload: payload.into(),
        }
    }

    /// Build a reply message.
    pub fn reply(code: u16, request_id: u32, status: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Reply { status },
            code,
            request_id,
            payload: payload.into(),
        }
    }

    /// Whether the sender waits for an answer.
    #[inline]
    pub fn expects_reply(&self) -> bool {
        self.kind == MessageKind::Request
    }

    /// Decode the payload as MsgPack.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.payload)
    }
}

/// The answer a handler produces for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code (see [`status`]).
    pub status: i32,
    /// Reply body.
    pub payload: Bytes,
}

impl Reply {
    /// Successful reply with the given body.
    pub fn ok(payload: impl Into<Bytes>) -> Self {
        Self::with_status(status::OK, payload)
    }

    /// Successful reply with an empty body.
    pub fn empty() -> Self {
        Self::ok(Bytes::new())
    }

    /// Reply with an explicit status.
    pub fn with_status(status: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    /// Successful reply carrying a MsgPack-encoded value.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::ok(MsgPackCodec::encode(value)?))
    }

    /// Decode the body as MsgPack.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.payload)
    }

    /// Whether the status is [`status::OK`].
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == status::OK
    }
}

impl Default for Reply {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let req = Message::request(4, 10, Bytes::from_static(b"x"));
        assert!(req.expects_reply());
        assert_eq!(req.request_id, 10);

        let note = Message::notification(4, Bytes::new());
        assert!(!note.expects_reply());
        assert_eq!(note.request_id, 0);

        let reply = Message::reply(4, 10, -7, Bytes::new());
        assert_eq!(reply.kind, MessageKind::Reply { status: -7 });
        assert!(!reply.expects_reply());
    }

    #[test]
    fn test_typed_reply() {
        let reply = Reply::encode(&vec![1u32, 2, 3]).unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.decode::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_default_reply_is_empty_ok() {
        let reply = Reply::default();
        assert_eq!(reply.status, status::OK);
        assert!(reply.payload.is_empty());
    }
}
