//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded tag + payload would exceed what the length byte can describe.
    #[error("packet overflow: {len} bytes after the length byte (limit {limit})")]
    PacketOverflow {
        /// Actual tag + payload size in bytes.
        len: usize,
        /// Maximum allowed tag + payload size.
        limit: usize,
    },

    /// A packet arrived with a length byte of zero (no type tag).
    #[error("empty packet: length byte of zero")]
    EmptyPacket,

    /// A field handed to the encoder contains a reserved byte.
    #[error("field contains reserved byte {byte:#04x}")]
    ReservedByte {
        /// The offending byte (separator or NUL).
        byte: u8,
    },

    /// Underlying transport error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
