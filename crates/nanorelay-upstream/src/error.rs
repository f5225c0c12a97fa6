use nanorelay_core::RelayError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by the upstream node connection.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connecting, reading or writing the WebSocket failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A single connect attempt exceeded its time budget.
    #[error("Connect timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// A subscription request could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] RelayError),

    /// Consecutive connect failures reached the configured limit.
    #[error("Gave up after {attempts} failed connection attempts")]
    RetriesExhausted { attempts: u32 },
}

impl UpstreamError {
    /// Whether the node was simply unreachable (refused, reset, timed out).
    pub fn is_unavailable(&self) -> bool {
        match self {
            UpstreamError::Timeout { .. } => true,
            UpstreamError::WebSocket(tungstenite::Error::Io(io_err)) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connection_is_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(UpstreamError::WebSocket(tungstenite::Error::Io(io)).is_unavailable());
    }

    #[test]
    fn protocol_errors_are_not_unavailable() {
        assert!(!UpstreamError::WebSocket(tungstenite::Error::ConnectionClosed).is_unavailable());
        assert!(!UpstreamError::RetriesExhausted { attempts: 3 }.is_unavailable());
        assert!(UpstreamError::Timeout { ms: 1000 }.is_unavailable());
    }
}
