//! Frame struct and reply payload helpers.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use shotsync::protocol::{Frame, Header, flags};
//! use bytes::Bytes;
//!
//! let header = Header::new(3, flags::REQUEST, 42, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.code(), 3);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, STATUS_SIZE};
use crate::error::{Result, ShotSyncError};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the message code.
    #[inline]
    pub fn code(&self) -> u16 {
        self.header.code
    }

    /// Get the request ID.
    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    /// Check if this frame answers a request.
    #[inline]
    pub fn is_reply(&self) -> bool {
        self.header.is_reply()
    }

    /// Check if this is a notification.
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.header.is_notification()
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use shotsync::protocol::{build_frame, Header, flags};
///
/// let header = Header::new(1, flags::REQUEST, 42, 5);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), 11 + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Prefix a reply body with its status.
pub fn encode_reply_payload(status: i32, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(STATUS_SIZE + body.len());
    buf.put_i32(status);
    buf.put_slice(body);
    buf.freeze()
}

/// Split a reply payload into status and body (zero-copy).
pub fn decode_reply_payload(payload: &Bytes) -> Result<(i32, Bytes)> {
    if payload.len() < STATUS_SIZE {
        return Err(ShotSyncError::Protocol(format!(
            "Reply payload of {} bytes is shorter than its status",
            payload.len()
        )));
    }
    let status = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    Ok((status, payload.slice(STATUS_SIZE..)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    #[test]
    fn test_build_frame_layout() {
        let header = Header::new(1, flags::REQUEST, 42, 5);
        let bytes = build_frame(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        assert_eq!(Header::decode(&bytes[..HEADER_SIZE]), Some(header));
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_reply_payload_carries_negative_status() {
        let payload = encode_reply_payload(-2, b"why");
        assert_eq!(payload.len(), STATUS_SIZE + 3);

        let (status, body) = decode_reply_payload(&payload).unwrap();
        assert_eq!(status, -2);
        assert_eq!(&body[..], b"why");
    }

    #[test]
    fn test_reply_payload_empty_body() {
        let payload = encode_reply_payload(0, b"");
        let (status, body) = decode_reply_payload(&payload).unwrap();
        assert_eq!(status, 0);
        assert!(body.is_empty());
    }

    #[test]
    fn test_reply_payload_too_short() {
        let payload = Bytes::from_static(&[0, 0]);
        assert!(matches!(
            decode_reply_payload(&payload),
            Err(ShotSyncError::Protocol(_))
        ));
    }

    #[test]
    fn test_body_slice_is_zero_copy() {
        let payload = encode_reply_payload(0, b"body");
        let (_, body) = decode_reply_payload(&payload).unwrap();
        assert_eq!(body.as_ptr(), payload[STATUS_SIZE..].as_ptr());
    }
}
