//! Error types for decoding envelopes and validating message fields.

use thiserror::Error;

use crate::protocol::messages::MessageType;

/// Errors that can occur while decoding an envelope or a catalog payload.
///
/// Every variant is recoverable: a decode failure never corrupts session
/// state, the offending bytes are simply rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload length does not match what the message type requires.
    #[error("payload length mismatch for {message_type:?}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },

    /// The message type byte is not part of the catalog.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownType(u8),

    /// The input ends before the frame it declares.
    #[error("truncated envelope: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The frame does not start with a recognised sync word.
    #[error("bad sync word: {0:02X?}")]
    BadSync(Vec<u8>),

    /// The declared payload length exceeds the protocol maximum.
    #[error("declared payload of {declared} bytes exceeds maximum of {max}")]
    PayloadTooLarge { declared: usize, max: usize },

    /// The trailing checksum byte does not match the frame contents.
    #[error("checksum mismatch: frame says 0x{received:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { received: u8, computed: u8 },

    /// Extra bytes follow a complete frame.
    #[error("{0} unexpected byte(s) after a complete envelope")]
    TrailingBytes(usize),

    /// The envelope carries a different message than the caller asked for.
    #[error("message type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: MessageType,
        actual: MessageType,
    },
}

/// Errors raised when constructing or mutating a message with invalid input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A device identifier must be exactly eight bytes.
    #[error("uuid must be exactly {expected} bytes, got {actual}")]
    UuidLength { expected: usize, actual: usize },

    /// The payload does not fit into a single envelope.
    #[error("payload of {actual} bytes exceeds maximum of {max}")]
    PayloadTooLarge { actual: usize, max: usize },
}
