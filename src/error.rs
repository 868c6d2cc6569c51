//! Error types for shotsync.

use thiserror::Error;

use crate::handler::HandlerId;

/// Main error type for all shotsync operations.
#[derive(Debug, Error)]
pub enum ShotSyncError {
    /// An empty or malformed handler was passed to registration.
    #[error("Invalid handler: {0}")]
    InvalidHandler(String),

    /// Compare-and-set registration lost against a concurrent writer.
    #[error("Registration race: expected {expected:?}, found {actual:?}")]
    RegistrationRace {
        /// Handler the caller expected to replace.
        expected: Option<HandlerId>,
        /// Handler that was actually active.
        actual: Option<HandlerId>,
    },

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (invalid frame, reserved flags, oversized payload).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A handler reported failure.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// The remote side answered a call with a non-zero status.
    #[error("Remote returned status {0}")]
    RemoteStatus(i32),

    /// A call did not receive its reply in time.
    #[error("Call timed out")]
    Timeout,

    /// Connection closed or client shut down.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using ShotSyncError.
pub type Result<T> = std::result::Result<T, ShotSyncError>;
