//! Error types for the voice mesh

/// Result type alias using the crate-level Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in voice mesh operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling relay error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Peer not found in the connection table
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Peer connection negotiation error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Local media capture error (fatal to the voice feature)
    #[error("Media error: {0}")]
    MediaError(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is isolated to a single peer entry
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_) | Error::PeerConnectionError(_)
        )
    }

    /// Check if this error disables the voice feature for the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MediaError(_) | Error::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");
    }

    #[test]
    fn test_error_is_peer_error() {
        assert!(Error::PeerNotFound("peer-1".to_string()).is_peer_error());
        assert!(Error::PeerConnectionError("test".to_string()).is_peer_error());
        assert!(!Error::MediaError("test".to_string()).is_peer_error());
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::MediaError("no device".to_string()).is_fatal());
        assert!(!Error::PeerConnectionError("test".to_string()).is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
    }
}
