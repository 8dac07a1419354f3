//! In-memory storage backend

use async_trait::async_trait;
use dashmap::DashMap;
use scribe_core::{Document, DocumentId, DocumentRepository, RepositoryError, RepositoryStats};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory storage backend
///
/// Keeps serialized snapshots so loads return independent copies.
/// Data is lost when the process exits.
pub struct MemoryStorage {
    data: DashMap<DocumentId, Vec<u8>>,
    total_size: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            total_size: AtomicUsize::new(0),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRepository for MemoryStorage {
    async fn save(&self, document: &Document) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec(document)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        let new_size = bytes.len();
        if let Some(old) = self.data.insert(document.id().clone(), bytes) {
            self.total_size.fetch_sub(old.len(), Ordering::Relaxed);
        }
        self.total_size.fetch_add(new_size, Ordering::Relaxed);
        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        match self.data.get(id) {
            Some(entry) => {
                let document = serde_json::from_slice(entry.value())
                    .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<DocumentId>, RepositoryError> {
        let mut ids: Vec<DocumentId> = self.data.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, RepositoryError> {
        Ok(self.data.contains_key(id))
    }

    async fn stats(&self) -> Result<RepositoryStats, RepositoryError> {
        Ok(RepositoryStats {
            document_count: self.data.len(),
            total_size_bytes: self.total_size.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::DocumentType;

    #[tokio::test]
    async fn test_save_and_load() {
        let storage = MemoryStorage::new();
        let mut doc = Document::new("Notes", DocumentType::Doc, "u1", "v1");
        doc.update_content("u1", "v2").unwrap();

        storage.save(&doc).await.unwrap();

        let loaded = storage.load(doc.id()).await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(loaded.versions().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let storage = MemoryStorage::new();
        let id = DocumentId::new("doc_absent").unwrap();

        assert!(storage.load(&id).await.unwrap().is_none());
        assert!(!storage.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_one_entry() {
        let storage = MemoryStorage::new();
        let mut doc = Document::new("Notes", DocumentType::Doc, "u1", "short");
        storage.save(&doc).await.unwrap();
        let first = storage.stats().await.unwrap().total_size_bytes;

        doc.update_content("u1", "a much longer body of text").unwrap();
        storage.save(&doc).await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert!(stats.total_size_bytes > first);
        assert_eq!(storage.list().await.unwrap(), vec![doc.id().clone()]);
    }
}
