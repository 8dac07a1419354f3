//! Scribe Core - collaborative document engine
//!
//! Documents carry their own access list, version log, comments and
//! suggestions. Clients join a document as sessions and receive every
//! change as an [`Event`] in the order it was committed.

pub mod broadcast;
pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod export;
pub mod repository;
pub mod service;
pub mod session;
pub mod store;

pub use broadcast::{BroadcastRouter, BroadcastStats, SessionFeed, TryRecvError};
pub use config::EngineConfig;
pub use document::{
    Access, Collaborator, Comment, Document, DocumentId, DocumentPatch, DocumentSummary,
    DocumentType, Permission, Reply, SelectionRange, Suggestion, SuggestionKind,
    SuggestionStatus, VersionEntry,
};
pub use error::{EntityKind, Error, Result};
pub use event::{Event, EventKind};
pub use export::{ExportFormat, ExportTicket};
pub use repository::{DocumentRepository, RepositoryError, RepositoryStats};
pub use service::{CollaborationService, JoinOutcome, ServiceStats};
pub use session::{ActiveSession, Session, SessionId, SessionRegistry, SessionTable};
pub use store::{DocumentSlot, DocumentStore};
