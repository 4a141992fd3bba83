//! Delivery error taxonomy

use std::time::Duration;

use thiserror::Error;

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Host unreachable {host}:{port}: {reason}")]
    Unreachable { host: String, port: u16, reason: String },

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Offline log error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    Frame(String),
}

/// How the connection loop reacts to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Try the next candidate host, then back off
    Connect,
    /// Persist the in-flight item and reconnect
    MidStream,
    /// Local disk problem; logged, never fatal
    Persistence,
}

impl CloudError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CloudError::Unreachable { .. }
            | CloudError::HandshakeTimeout(_)
            | CloudError::HandshakeRejected(_) => FailureKind::Connect,
            CloudError::Transport(_) | CloudError::ConnectionClosed | CloudError::Frame(_) => {
                FailureKind::MidStream
            }
            CloudError::Persistence(_) | CloudError::Serialization(_) => FailureKind::Persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let unreachable = CloudError::Unreachable {
            host: "localhost".into(),
            port: 8080,
            reason: "refused".into(),
        };
        assert_eq!(unreachable.kind(), FailureKind::Connect);
        assert_eq!(
            CloudError::HandshakeTimeout(Duration::from_secs(5)).kind(),
            FailureKind::Connect
        );
        assert_eq!(CloudError::ConnectionClosed.kind(), FailureKind::MidStream);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert_eq!(CloudError::from(io).kind(), FailureKind::Persistence);
    }

    #[test]
    fn test_display_names_host() {
        let err = CloudError::Unreachable {
            host: "10.0.0.2".into(),
            port: 61613,
            reason: "timeout".into(),
        };
        assert_eq!(err.to_string(), "Host unreachable 10.0.0.2:61613: timeout");
    }
}
