//! Error types for Scribe Core

use thiserror::Error;

/// The kind of entity an unknown id referred to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Document,
    Version,
    Session,
    Suggestion,
    Comment,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Document => write!(f, "document"),
            EntityKind::Version => write!(f, "version"),
            EntityKind::Session => write!(f, "session"),
            EntityKind::Suggestion => write!(f, "suggestion"),
            EntityKind::Comment => write!(f, "comment"),
        }
    }
}

/// Core error types
///
/// Messages only echo ids supplied by the caller, never document state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Access denied")]
    AccessDenied,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::NotFound { kind, id: id.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Error::Forbidden(reason.into())
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::AccessDenied => "ACCESS_DENIED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

/// Result type alias for Scribe Core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found(EntityKind::Version, "7");
        assert_eq!(err.to_string(), "version not found: 7");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_access_denied_carries_no_detail() {
        assert_eq!(Error::AccessDenied.to_string(), "Access denied");
    }
}
