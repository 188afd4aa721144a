//! Error types for framelink.

use thiserror::Error;

/// Result type alias using framelink's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for framelink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Memory allocation failed (heap or shared-memory setup).
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    /// The shared-memory arena has no free range large enough.
    #[error("arena exhausted: no free block of {requested} bytes")]
    ArenaExhausted {
        /// Number of bytes that were requested.
        requested: usize,
    },

    /// The caller violated an API contract (bounds, foreign pointer, bad handle).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation does not support the given format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The peer sent something the control protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    /// Whether this error came from the transport layer (socket or protocol)
    /// and should be handled by tearing down the affected connection.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Error::Io(_) | Error::System(_) | Error::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_fault_classification() {
        let io = Error::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(io.is_connection_fault());
        assert!(Error::Protocol("bad opcode".into()).is_connection_fault());
        assert!(!Error::InvalidArgument("roi".into()).is_connection_fault());
        assert!(!Error::ArenaExhausted { requested: 16 }.is_connection_fault());
    }

    #[test]
    fn test_display() {
        let err = Error::ArenaExhausted { requested: 4096 };
        assert_eq!(err.to_string(), "arena exhausted: no free block of 4096 bytes");
    }
}
