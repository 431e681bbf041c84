//! Client error types.

use thiserror::Error;

/// Errors surfaced by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] adbr_protocol::ProtocolError),

    #[error("failure: '{message}'")]
    Fail { message: String },

    #[error("premature end of stream, needed {missing} more bytes")]
    PrematureEof { missing: usize },

    #[error("unexpected '{got}', was expecting {expected}")]
    UnexpectedData { got: String, expected: String },

    #[error("{path}: no such file or directory")]
    NotFound { path: String },

    #[error("{apk} could not be installed [{code}]")]
    Install { apk: String, code: String },

    #[error("{op} timed out")]
    Timeout { op: &'static str },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("adb start-server failed: {0}")]
    StartServer(String),
}

impl ClientError {
    /// Builds the error for a reply that matched neither branch of a
    /// command's expected responses.
    pub fn unexpected(got: impl AsRef<[u8]>, expected: &str) -> Self {
        ClientError::UnexpectedData {
            got: String::from_utf8_lossy(got.as_ref()).into_owned(),
            expected: expected.to_string(),
        }
    }
}
