//! Document store - keyed, per-document critical sections

use crate::document::{Document, DocumentId};
use crate::error::{EntityKind, Error, Result};
use crate::session::SessionTable;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Everything that must change together for one document
pub struct DocumentSlot {
    pub document: Document,
    pub sessions: SessionTable,
}

impl DocumentSlot {
    fn new(document: Document) -> Self {
        Self {
            document,
            sessions: SessionTable::default(),
        }
    }
}

/// Holds every live document behind its own lock.
///
/// Operations on different documents run in parallel; operations on the
/// same document are serialized by the slot mutex.
pub struct DocumentStore {
    slots: DashMap<DocumentId, Arc<Mutex<DocumentSlot>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Insert a document. Returns `false` if one with the same id exists.
    pub fn insert(&self, document: Document) -> bool {
        self.insert_with(document, |_| {})
    }

    /// Insert a document, running `on_insert` before any other caller can
    /// reach it. `on_insert` is skipped when the id is taken.
    pub fn insert_with(&self, document: Document, on_insert: impl FnOnce(&Document)) -> bool {
        match self.slots.entry(document.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                on_insert(&document);
                vacant.insert(Arc::new(Mutex::new(DocumentSlot::new(document))));
                true
            }
        }
    }

    /// Run `f` with exclusive access to a document and its sessions
    pub fn with_slot<R>(
        &self,
        id: &DocumentId,
        f: impl FnOnce(&mut DocumentSlot) -> Result<R>,
    ) -> Result<R> {
        // Clone the Arc so the map shard is not held while we wait on the slot.
        let slot = self
            .slots
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::not_found(EntityKind::Document, id.as_str()))?;

        let mut guard = slot.lock();
        f(&mut guard)
    }

    /// Clone the current state of a document without any access check
    pub fn snapshot(&self, id: &DocumentId) -> Result<Document> {
        self.with_slot(id, |slot| Ok(slot.document.clone()))
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.slots.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
