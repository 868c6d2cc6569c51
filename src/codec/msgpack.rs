//! MsgPack codec using `rmp-serde`.
//!
//! Always encode with `to_vec_named`: structs go on the wire as maps keyed by
//! field name, so peers can add or reorder fields without breaking decoding.
//!
//! # Example
//!
//! ```
//! use shotsync::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Shot {
//!     index: u32,
//!     label: String,
//! }
//!
//! let shot = Shot { index: 7, label: "wide".to_string() };
//! let encoded = MsgPackCodec::encode(&shot).unwrap();
//! let decoded: Shot = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, shot);
//! ```

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShotSyncError;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct SyncRequest {
        session: u32,
        take: String,
        frames: Vec<u64>,
    }

    #[test]
    fn test_struct_is_encoded_as_map() {
        let req = SyncRequest {
            session: 1,
            take: "A".to_string(),
            frames: vec![],
        };

        let encoded = MsgPackCodec::encode(&req).unwrap();

        // fixmap with 3 entries, not fixarray (0x93)
        assert_eq!(encoded[0], 0x83, "expected fixmap, got {:02X}", encoded[0]);

        let decoded: SyncRequest = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_option_none_is_nil() {
        let val: Option<u32> = None;
        assert_eq!(MsgPackCodec::encode(&val).unwrap(), vec![0xc0]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<SyncRequest> = MsgPackCodec::decode(b"not msgpack");
        assert!(matches!(result, Err(ShotSyncError::MsgPackDecode(_))));
    }

    #[test]
    fn test_decode_empty_input_fails() {
        let result: Result<u32> = MsgPackCodec::decode(&[]);
        assert!(result.is_err());
    }
}
