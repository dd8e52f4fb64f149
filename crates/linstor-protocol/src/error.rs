//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing or decoding controller traffic.
///
/// Every variant except [`ProtocolError::Encoding`] means the byte stream can
/// no longer be trusted; the connection is torn down rather than resynced.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Fewer than 16 bytes were handed to the envelope decoder.
    #[error("incomplete frame header: expected {expected} bytes, got {received}")]
    IncompleteHeader { expected: usize, received: usize },

    /// A message length prefix points past the end of the frame body.
    #[error("truncated frame: message at offset {offset} needs {needed} bytes, {available} left")]
    Truncated {
        offset: usize,
        needed: u64,
        available: usize,
    },

    /// A varint length prefix could not be decoded.
    #[error("invalid varint length prefix at offset {offset}")]
    InvalidVarint { offset: usize },

    /// The frame body contained no message at all.
    #[error("frame carries no header message")]
    EmptyFrame,

    /// Declared or produced frame exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u64, max: u32 },

    /// An outgoing frame could not be built.
    #[error("failed to encode frame: {0}")]
    Encoding(String),

    /// A message did not decode as the schema expected by its opcode.
    #[error("failed to decode {message}: {source}")]
    Decode {
        message: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    /// The header names an opcode this client does not know.
    #[error("unknown api call '{0}'")]
    UnknownApiCall(String),

    /// A known opcode arrived where the session does not allow it.
    #[error("unexpected api call '{received}' (expected {expected})")]
    UnexpectedApiCall {
        expected: &'static str,
        received: String,
    },

    /// A reply opcode arrived without the payload message it requires.
    #[error("{api_call} reply is missing its payload message")]
    MissingPayload { api_call: &'static str },
}

impl ProtocolError {
    /// Creates a decode error for the named message type.
    pub fn decode(message: &'static str, source: prost::DecodeError) -> Self {
        Self::Decode { message, source }
    }
}
