//! # Error Definitions
//!
//! The central ledger of protocol-level failures.

/// Failures within the wire protocol itself.
///
/// These are distinct from [`crate::reply::Fault`]; a `Fault` is the *remote*
/// side reporting that an operation failed, whereas `Error` means the bytes
/// on the wire could not be understood at all.
#[derive(Debug)]
pub enum Error {
    /// The underlying JSON serialization failed.
    Serialization(serde_json::Error),
    /// The envelope was structurally valid JSON but violated the protocol
    /// (e.g., a call without a correlation id).
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
