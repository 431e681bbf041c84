//! Bridge error types.

use thiserror::Error;

/// Errors raised by the bridge's socket and service machinery.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] adbr_protocol::ProtocolError),

    #[error("client error: {0}")]
    Client(#[from] adbr_client::ClientError),

    #[error("unauthorized access before authentication completed")]
    Unauthorized,

    #[error("unknown command {0:#010x}")]
    UnknownCommand(u32),

    #[error("unknown authentication method {0}")]
    UnknownAuthMethod(u32),

    #[error("public key sent before signature")]
    PublicKeyBeforeSignature,

    #[error("authentication packet out of order")]
    AuthBeforeConnection,

    #[error("public key was not accepted")]
    KeyRejected,

    #[error("empty service name")]
    EmptyServiceName,

    #[error("remote id {0} is already being used")]
    ServiceExists(u32),

    #[error("received a packet for non-existent service {0}")]
    ServiceNotFound(u32),

    #[error("connection ended")]
    Ended,
}
