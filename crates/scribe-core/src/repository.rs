//! Persistence seam for documents
//!
//! The in-memory store is the live source of truth. A configured
//! [`DocumentRepository`] receives every committed snapshot through a single
//! background writer so saves land in commit order and never run under a
//! document lock.

use crate::document::{Document, DocumentId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Storage backend for document snapshots
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert or replace a document
    async fn save(&self, document: &Document) -> Result<(), RepositoryError>;

    /// Load a document
    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;

    /// List every stored document id
    async fn list(&self) -> Result<Vec<DocumentId>, RepositoryError>;

    /// Check if a document exists
    async fn exists(&self, id: &DocumentId) -> Result<bool, RepositoryError>;

    /// Get storage statistics
    async fn stats(&self) -> Result<RepositoryStats, RepositoryError>;
}

/// Repository error types
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Repository statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    pub document_count: usize,
    pub total_size_bytes: usize,
}

enum PersistOp {
    Save(Box<Document>),
    Flush(oneshot::Sender<()>),
}

/// Ordered write-through queue in front of a repository
pub(crate) struct PersistenceQueue {
    sender: mpsc::UnboundedSender<PersistOp>,
}

impl PersistenceQueue {
    /// Start the writer task. Must be called from within a Tokio runtime.
    pub(crate) fn spawn(repository: Arc<dyn DocumentRepository>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(op) = receiver.recv().await {
                match op {
                    PersistOp::Save(document) => {
                        if let Err(e) = repository.save(&document).await {
                            warn!(doc_id = %document.id(), error = %e, "Failed to persist document");
                        }
                    }
                    PersistOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persistence writer stopped");
        });

        Self { sender }
    }

    pub(crate) fn enqueue(&self, document: Document) {
        let id = document.id().clone();
        if self.sender.send(PersistOp::Save(Box::new(document))).is_err() {
            warn!(doc_id = %id, "Persistence writer gone, snapshot not saved");
        }
    }

    /// Wait until everything queued before this call has been written
    pub(crate) async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(PersistOp::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
