//! Wire format encoding and decoding.
//!
//! Implements the 11-byte header format:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Code     │ Flags │ Req ID   │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. Reply payloads start with a
//! 4-byte big-endian `i32` status (see [`super::frame::encode_reply_payload`]).

use crate::error::{Result, ShotSyncError};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Size of the status prefix carried by reply payloads.
pub const STATUS_SIZE: usize = 4;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Reserved message code (never use).
pub const RESERVED_CODE: u16 = 0;

/// Flag constants for the protocol.
pub mod flags {
    /// The sender does not expect a reply (notification).
    pub const NO_REPLY: u8 = 0b0000_0001;
    /// The frame answers an earlier request.
    pub const IS_REPLY: u8 = 0b0000_0010;
    /// Reply carries a non-zero status.
    pub const IS_ERROR: u8 = 0b0000_0100;

    /// Reserved bits mask (bits 3-7).
    pub const RESERVED_MASK: u8 = 0b1111_1000;

    /// Plain request expecting a reply.
    pub const REQUEST: u8 = 0;
    /// Successful reply.
    pub const REPLY: u8 = IS_REPLY;
    /// Failed reply (non-zero status).
    pub const ERROR_REPLY: u8 = IS_REPLY | IS_ERROR;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Application message code (0 reserved).
    pub code: u16,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Request identifier (0 for notifications).
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(code: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            code,
            flags,
            request_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use shotsync::protocol::{Header, flags};
    ///
    /// let header = Header::new(1, flags::REPLY, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.code.to_be_bytes());
        buf[2] = self.flags;
        buf[3..7].copy_from_slice(&self.request_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            code: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2],
            request_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Code is not 0 (reserved)
    /// - Payload length doesn't exceed max (for replies the limit covers the
    ///   body, so the status prefix comes on top)
    /// - Reserved flag bits are 0
    /// - Replies carry at least a status
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.code == RESERVED_CODE {
            return Err(ShotSyncError::Protocol("Code 0 is reserved".to_string()));
        }

        let limit = if self.is_reply() {
            max_payload_size.saturating_add(STATUS_SIZE as u32)
        } else {
            max_payload_size
        };
        if self.payload_length > limit {
            return Err(ShotSyncError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, limit
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(ShotSyncError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        if self.is_reply() && (self.payload_length as usize) < STATUS_SIZE {
            return Err(ShotSyncError::Protocol(
                "Reply frame is missing its status".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this frame answers a request.
    #[inline]
    pub fn is_reply(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_REPLY)
    }

    /// Check if this is an error reply.
    #[inline]
    pub fn is_error(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_ERROR)
    }

    /// Check if this is a notification (no reply expected).
    #[inline]
    pub fn is_notification(&self) -> bool {
        !self.is_reply() && flags::has_flag(self.flags, flags::NO_REPLY)
    }
}
