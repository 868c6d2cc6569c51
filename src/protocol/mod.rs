//! Protocol module - wire format and framing.
//!
//! - 11-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Reply payloads prefixed with an `i32` status

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, decode_reply_payload, encode_reply_payload, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, RESERVED_CODE, STATUS_SIZE,
};
