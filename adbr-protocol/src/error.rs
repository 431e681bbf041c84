//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed length prefix {0:?}")]
    MalformedLength(String),

    #[error("short frame: declared {declared} payload bytes, only {available} available")]
    ShortFrame { declared: usize, available: usize },

    #[error("magic mismatch: command {command:#010x}, magic {magic:#010x}")]
    MagicMismatch { command: u32, magic: u32 },

    #[error("checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
