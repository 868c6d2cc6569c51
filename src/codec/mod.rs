//! Codec module - payload serialization for typed handlers and calls.
//!
//! Frames carry opaque bytes. When an application wants structured payloads,
//! [`MsgPackCodec`] encodes them with `rmp-serde` in struct-as-map form.
//!
//! # Example
//!
//! ```
//! use shotsync::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
