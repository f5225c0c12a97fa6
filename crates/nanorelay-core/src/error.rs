use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl RelayError {
    /// Short error code string used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "CONFIG_ERROR",
            RelayError::Protocol(_) => "PROTOCOL_ERROR",
            RelayError::Serialization(_) => "SERIALIZATION_ERROR",
            RelayError::Io(_) => "IO_ERROR",
            RelayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }

    /// Whether the connection that produced this error should be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::PayloadTooLarge { .. } | RelayError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
