//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Identify first with AS <userId> [name]")]
    NoIdentity,

    #[error(transparent)]
    Core(#[from] scribe_core::Error),
}

impl ProtocolError {
    /// Error code sent in `-ERR` responses
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::InvalidCommand(_) => "INVALID_CMD",
            ProtocolError::MissingArgument(_) => "MISSING_ARG",
            ProtocolError::InvalidArgument(_) => "INVALID_ARG",
            ProtocolError::MessageTooLarge { .. } => "TOO_LARGE",
            ProtocolError::InvalidJson(_) => "INVALID_JSON",
            ProtocolError::NoIdentity => "NOAUTH",
            ProtocolError::Core(e) => e.code(),
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
