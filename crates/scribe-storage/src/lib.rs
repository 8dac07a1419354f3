//! Scribe Storage Backends
//!
//! Implementations of [`scribe_core::DocumentRepository`]:
//! - Memory (default): volatile, for development and tests
//! - SQLite: embedded persistence
//! - PostgreSQL: shared persistence
//!
//! The database backends store each document as a MessagePack blob.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

pub use scribe_core::{DocumentRepository, RepositoryError, RepositoryStats};

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) mod blob {
    use scribe_core::{Document, DocumentId, RepositoryError};
    use std::fmt::Display;
    use tracing::warn;

    pub fn encode(document: &Document) -> Result<Vec<u8>, RepositoryError> {
        rmp_serde::to_vec_named(document).map_err(|e| RepositoryError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Document, RepositoryError> {
        rmp_serde::from_slice(bytes).map_err(|e| RepositoryError::Serialization(e.to_string()))
    }

    /// Validate an id read back from a row, skipping it with a warning if unusable
    pub fn stored_id<E: Display>(raw: Result<String, E>) -> Option<DocumentId> {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable document row");
                return None;
            }
        };
        match DocumentId::new(raw.as_str()) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(id = %raw, error = %e, "Skipping stored document with invalid id");
                None
            }
        }
    }
}
