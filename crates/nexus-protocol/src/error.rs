//! Error types for the protocol layer.
//!
//! Every variant describes a frame that cannot be decoded. None of them
//! are fatal: the caller logs the error, drops the frame, and keeps the
//! connection open. Clients never get an answer for malformed input.

/// Errors that can occur while decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame had no bytes at all.
    #[error("empty frame")]
    Empty,

    /// The frame is shorter than the minimum length for its opcode.
    #[error("frame too short for opcode {opcode}: {len} bytes")]
    Truncated {
        /// The opcode (or sub-opcode) being decoded.
        opcode: u8,
        /// The actual frame length.
        len: usize,
    },

    /// Byte 0 is not one of the documented top-level opcodes.
    #[error("unrecognized opcode {0}")]
    UnknownOpcode(u8),

    /// The hub sub-opcode is neither create nor join.
    #[error("unrecognized hub command {0}")]
    UnknownHubCommand(u8),

    /// The room sub-opcode or the frame shape is not recognized.
    #[error("unrecognized room command {0}")]
    UnknownRoomCommand(u8),

    /// The JSON body of a hub command failed to parse.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
