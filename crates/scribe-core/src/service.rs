//! Collaboration service - the single entry point for client actions
//!
//! Each mutating call takes the document's lock once, applies the change to
//! the document, updates the session table if needed, publishes the
//! resulting event to the document's sessions, queues the committed
//! snapshot for persistence, and releases the lock. Queueing is a
//! non-blocking channel send, so the repository sees snapshots of a
//! document in the same order they were committed.
//!
//! Consistency model: whole-document last-writer-wins. Concurrent content
//! updates on one document are applied in lock order; every one that
//! changes the content archives the state it replaced, so nothing is lost
//! from the version log even though later writes overwrite earlier ones.
//!
//! A session's `can_edit` flag is a snapshot taken at join time. Write
//! checks always use the document's current access list, so a downgrade is
//! enforced immediately, but the flag shown to other users only refreshes
//! on the next join.

use crate::broadcast::{BroadcastRouter, BroadcastStats, SessionFeed};
use crate::config::EngineConfig;
use crate::document::{
    now_millis, Comment, Document, DocumentId, DocumentPatch, DocumentSummary, DocumentType,
    Permission, Reply, SelectionRange, Suggestion, SuggestionKind, VersionEntry,
};
use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use crate::export::{ExportFormat, ExportTicket};
use crate::repository::{DocumentRepository, PersistenceQueue, RepositoryError};
use crate::session::{idle_cutoff, ActiveSession, Session, SessionId, SessionRegistry};
use crate::store::{DocumentSlot, DocumentStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Everything a client needs right after joining a document
#[derive(Debug)]
pub struct JoinOutcome {
    pub session: Session,
    pub document: Document,
    /// All sessions on the document, including the new one
    pub active_sessions: Vec<ActiveSession>,
    /// Events for this session; the first one is its own `user-joined`
    pub feed: SessionFeed,
}

/// Service statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub document_count: usize,
    pub session_count: usize,
    pub events_delivered: u64,
    pub events_dropped: u64,
}

/// Collaborative document engine
pub struct CollaborationService {
    config: EngineConfig,
    store: DocumentStore,
    sessions: SessionRegistry,
    router: BroadcastRouter,
    repository: Option<Arc<dyn DocumentRepository>>,
    persistence: Option<PersistenceQueue>,
}

impl CollaborationService {
    /// Create an in-memory service
    pub fn new(config: EngineConfig) -> Self {
        let router = BroadcastRouter::new(config.channel_capacity);

        Self {
            config,
            store: DocumentStore::new(),
            sessions: SessionRegistry::new(),
            router,
            repository: None,
            persistence: None,
        }
    }

    /// Create a service that writes every committed snapshot to `repository`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; the persistence writer is
    /// spawned onto it.
    pub fn with_repository(config: EngineConfig, repository: Arc<dyn DocumentRepository>) -> Self {
        let mut service = Self::new(config);
        service.persistence = Some(PersistenceQueue::spawn(repository.clone()));
        service.repository = Some(repository);
        service
    }

    /// Load every stored document into memory. Returns the number loaded.
    pub async fn hydrate(&self) -> std::result::Result<usize, RepositoryError> {
        let repository = match &self.repository {
            Some(r) => r,
            None => return Ok(0),
        };

        let mut loaded = 0;
        for id in repository.list().await? {
            if self.store.contains(&id) {
                continue;
            }
            if let Some(document) = repository.load(&id).await? {
                if self.store.insert(document) {
                    loaded += 1;
                }
            }
        }

        info!(documents = loaded, "Hydrated documents from storage");
        Ok(loaded)
    }

    /// Wait until every snapshot committed so far has been written
    pub async fn flush(&self) {
        if let Some(queue) = &self.persistence {
            queue.flush().await;
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> ServiceStats {
        let BroadcastStats { delivered, dropped } = self.router.stats();
        ServiceStats {
            document_count: self.store.len(),
            session_count: self.sessions.len(),
            events_delivered: delivered,
            events_dropped: dropped,
        }
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    pub fn create_document(
        &self,
        title: &str,
        kind: DocumentType,
        owner_id: &str,
        content: &str,
    ) -> Result<Document> {
        require_user(owner_id)?;
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("Title cannot be empty".into()));
        }
        self.check_content(content)?;

        let document = Document::new(title, kind, owner_id, content);
        if !self
            .store
            .insert_with(document.clone(), |document| self.persist(document))
        {
            return Err(Error::InvalidInput(format!(
                "Document already exists: {}",
                document.id()
            )));
        }

        info!(doc_id = %document.id(), owner = owner_id, kind = %kind, "Document created");
        Ok(document)
    }

    pub fn get_document(&self, doc_id: &DocumentId, caller: &str) -> Result<Document> {
        self.store.with_slot(doc_id, |slot| {
            slot.document.ensure_readable(caller)?;
            Ok(slot.document.clone())
        })
    }

    /// Documents `caller` can read, most recently updated first
    pub fn list_documents(&self, caller: &str) -> Vec<DocumentSummary> {
        let mut summaries: Vec<DocumentSummary> = self
            .store
            .ids()
            .iter()
            .filter_map(|id| {
                self.store
                    .with_slot(id, |slot| {
                        Ok(slot
                            .document
                            .can_read(caller)
                            .then(|| slot.document.summary()))
                    })
                    .ok()
                    .flatten()
            })
            .collect();

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    pub fn update_content(
        &self,
        doc_id: &DocumentId,
        caller: &str,
        content: &str,
    ) -> Result<Document> {
        self.update_document(doc_id, caller, DocumentPatch::content(content))
    }

    /// Apply a title and/or content change and broadcast `document-update`
    pub fn update_document(
        &self,
        doc_id: &DocumentId,
        caller: &str,
        patch: DocumentPatch,
    ) -> Result<Document> {
        if patch.is_empty() {
            return Err(Error::InvalidInput("Nothing to update".into()));
        }
        if let Some(content) = &patch.content {
            self.check_content(content)?;
        }

        self.store.with_slot(doc_id, |slot| {
            let versioned = slot.document.apply_patch(caller, patch.clone())?;
            debug!(doc_id = %doc_id, user = caller, versioned, version = slot.document.version(), "Document updated");

            let event = Event::new(
                doc_id.clone(),
                EventKind::DocumentUpdate {
                    updates: patch,
                    version: slot.document.version(),
                    user_id: caller.to_string(),
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(slot.document.clone())
        })
    }

    pub fn add_collaborator(
        &self,
        doc_id: &DocumentId,
        owner_id: &str,
        collaborator_id: &str,
        permission: Permission,
    ) -> Result<Document> {
        let (document, added) = self.store.with_slot(doc_id, |slot| {
            let added = slot
                .document
                .add_collaborator(owner_id, collaborator_id, permission)?;
            if added {
                self.persist(&slot.document);
            }
            Ok((slot.document.clone(), added))
        })?;

        if added {
            info!(doc_id = %doc_id, collaborator = collaborator_id, permission = %permission, "Collaborator added");
        }
        Ok(document)
    }

    /// Revoke access and close every session the collaborator has open
    pub fn remove_collaborator(
        &self,
        doc_id: &DocumentId,
        owner_id: &str,
        collaborator_id: &str,
    ) -> Result<Document> {
        let (document, closed) = self.store.with_slot(doc_id, |slot| {
            let removed = slot.document.remove_collaborator(owner_id, collaborator_id)?;
            let closed = if removed {
                self.persist(&slot.document);
                Some(self.disconnect_user(slot, collaborator_id, true))
            } else {
                None
            };
            Ok((slot.document.clone(), closed))
        })?;

        if let Some(closed) = closed {
            info!(doc_id = %doc_id, collaborator = collaborator_id, sessions_closed = closed, "Collaborator removed");
        }
        Ok(document)
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    pub fn add_comment(
        &self,
        doc_id: &DocumentId,
        caller: &str,
        user_name: &str,
        text: &str,
        selection: Option<SelectionRange>,
    ) -> Result<Comment> {
        self.store.with_slot(doc_id, |slot| {
            let comment = slot.document.add_comment(caller, user_name, text, selection)?;
            let event = Event::new(
                doc_id.clone(),
                EventKind::CommentAdded {
                    comment: comment.clone(),
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(comment)
        })
    }

    pub fn reply_to_comment(
        &self,
        doc_id: &DocumentId,
        comment_id: &str,
        caller: &str,
        user_name: &str,
        text: &str,
    ) -> Result<Reply> {
        self.store.with_slot(doc_id, |slot| {
            let reply = slot
                .document
                .reply_to_comment(comment_id, caller, user_name, text)?;
            let event = Event::new(
                doc_id.clone(),
                EventKind::CommentReply {
                    comment_id: comment_id.to_string(),
                    reply: reply.clone(),
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(reply)
        })
    }

    /// Resolve a comment. Any reader may resolve; repeating is a no-op.
    pub fn resolve_comment(
        &self,
        doc_id: &DocumentId,
        comment_id: &str,
        caller: &str,
    ) -> Result<Comment> {
        self.store.with_slot(doc_id, |slot| {
            let (comment, changed) = slot.document.resolve_comment(comment_id, caller)?;
            if !changed {
                return Ok(comment);
            }

            let event = Event::new(
                doc_id.clone(),
                EventKind::CommentResolved {
                    comment_id: comment_id.to_string(),
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(comment)
        })
    }

    // ------------------------------------------------------------------
    // Suggestions
    // ------------------------------------------------------------------

    pub fn add_suggestion(
        &self,
        doc_id: &DocumentId,
        caller: &str,
        user_name: &str,
        kind: SuggestionKind,
        content: &str,
        selection: Option<SelectionRange>,
    ) -> Result<Suggestion> {
        self.check_content(content)?;

        self.store.with_slot(doc_id, |slot| {
            let suggestion = slot
                .document
                .add_suggestion(caller, user_name, kind, content, selection)?;
            let event = Event::new(
                doc_id.clone(),
                EventKind::SuggestionAdded {
                    suggestion: suggestion.clone(),
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(suggestion)
        })
    }

    /// Accept a pending suggestion. Owner only.
    pub fn accept_suggestion(
        &self,
        doc_id: &DocumentId,
        suggestion_id: &str,
        caller: &str,
    ) -> Result<Suggestion> {
        self.store.with_slot(doc_id, |slot| {
            let suggestion = slot.document.accept_suggestion(suggestion_id, caller)?;
            let event = Event::new(
                doc_id.clone(),
                EventKind::SuggestionAccepted {
                    suggestion_id: suggestion_id.to_string(),
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(suggestion)
        })
    }

    /// Reject a pending suggestion. Owner only.
    pub fn reject_suggestion(
        &self,
        doc_id: &DocumentId,
        suggestion_id: &str,
        caller: &str,
    ) -> Result<Suggestion> {
        self.store.with_slot(doc_id, |slot| {
            let suggestion = slot.document.reject_suggestion(suggestion_id, caller)?;
            let event = Event::new(
                doc_id.clone(),
                EventKind::SuggestionRejected {
                    suggestion_id: suggestion_id.to_string(),
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(suggestion)
        })
    }

    // ------------------------------------------------------------------
    // Versions and export
    // ------------------------------------------------------------------

    pub fn version_history(&self, doc_id: &DocumentId, caller: &str) -> Result<Vec<VersionEntry>> {
        self.store
            .with_slot(doc_id, |slot| Ok(slot.document.version_history(caller)?.to_vec()))
    }

    pub fn restore_version(
        &self,
        doc_id: &DocumentId,
        version: u64,
        caller: &str,
    ) -> Result<Document> {
        let document = self.store.with_slot(doc_id, |slot| {
            let content = slot.document.restore_version(version, caller)?;
            let event = Event::new(
                doc_id.clone(),
                EventKind::VersionRestored {
                    version_number: version,
                    content,
                },
            );
            self.router.publish(&slot.sessions, &event, None);
            self.persist(&slot.document);
            Ok(slot.document.clone())
        })?;

        info!(doc_id = %doc_id, restored = version, version = document.version(), user = caller, "Version restored");
        Ok(document)
    }

    /// Authorize an export and describe where the renderer will publish it
    pub fn export_document(
        &self,
        doc_id: &DocumentId,
        caller: &str,
        format: ExportFormat,
    ) -> Result<ExportTicket> {
        self.store
            .with_slot(doc_id, |slot| slot.document.ensure_readable(caller))?;

        debug!(doc_id = %doc_id, user = caller, format = %format, "Export authorized");
        Ok(ExportTicket::new(
            &self.config.export_base_url,
            doc_id.clone(),
            format,
            now_millis(),
        ))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Open a session on a document the user can read
    pub fn join(&self, doc_id: &DocumentId, user_id: &str, user_name: &str) -> Result<JoinOutcome> {
        require_user(user_id)?;

        let outcome = self.store.with_slot(doc_id, |slot| {
            slot.document.ensure_readable(user_id)?;

            let now = now_millis();
            let session = Session {
                id: SessionId::generate(),
                doc_id: doc_id.clone(),
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                can_edit: slot.document.can_write(user_id),
                connected_at: now,
                last_activity: now,
                cursor: None,
            };

            let (sender, feed) = self.router.open(&session.id);
            self.sessions.register(&mut slot.sessions, session.clone(), sender);

            let event = Event::new(
                doc_id.clone(),
                EventKind::UserJoined {
                    user_id: session.user_id.clone(),
                    user_name: session.user_name.clone(),
                    can_edit: session.can_edit,
                },
            );
            self.router.publish(&slot.sessions, &event, None);

            Ok(JoinOutcome {
                session,
                document: slot.document.clone(),
                active_sessions: slot.sessions.active(),
                feed,
            })
        })?;

        info!(doc_id = %doc_id, session = %outcome.session.id, user = user_id, can_edit = outcome.session.can_edit, "Session joined");
        Ok(outcome)
    }

    /// End a session. Unknown sessions are ignored.
    pub fn leave(&self, session_id: &SessionId) -> bool {
        let doc_id = match self.sessions.document_of(session_id) {
            Some(id) => id,
            None => return false,
        };

        let left = self
            .store
            .with_slot(&doc_id, |slot| {
                let entry = match self.sessions.unregister(&mut slot.sessions, session_id) {
                    Some(entry) => entry,
                    None => return Ok(false),
                };

                let event = Event::new(
                    doc_id.clone(),
                    EventKind::UserLeft {
                        user_id: entry.session.user_id.clone(),
                        user_name: entry.session.user_name.clone(),
                    },
                );
                drop(entry);
                self.router.publish(&slot.sessions, &event, None);
                Ok(true)
            })
            .unwrap_or(false);

        if left {
            info!(doc_id = %doc_id, session = %session_id, "Session left");
        }
        left
    }

    /// Record a cursor move and tell every other session. Unknown sessions are ignored.
    pub fn update_cursor(&self, session_id: &SessionId, cursor: serde_json::Value) -> bool {
        let doc_id = match self.sessions.document_of(session_id) {
            Some(id) => id,
            None => return false,
        };

        self.store
            .with_slot(&doc_id, |slot| {
                let session = match self.sessions.move_cursor(&mut slot.sessions, session_id, cursor) {
                    Some(session) => session,
                    None => return Ok(false),
                };

                let event = Event::new(
                    doc_id.clone(),
                    EventKind::CursorUpdate {
                        user_id: session.user_id,
                        user_name: session.user_name,
                        cursor: session.cursor.unwrap_or_default(),
                    },
                );
                self.router.publish(&slot.sessions, &event, Some(session_id));
                Ok(true)
            })
            .unwrap_or(false)
    }

    pub fn session(&self, session_id: &SessionId) -> Option<Session> {
        let doc_id = self.sessions.document_of(session_id)?;
        self.store
            .with_slot(&doc_id, |slot| Ok(slot.sessions.get(session_id).cloned()))
            .ok()
            .flatten()
    }

    pub fn active_sessions(&self, doc_id: &DocumentId) -> Result<Vec<ActiveSession>> {
        self.store.with_slot(doc_id, |slot| Ok(slot.sessions.active()))
    }

    /// Close every session `user_id` has on the document
    pub fn force_disconnect(&self, doc_id: &DocumentId, user_id: &str) -> Result<usize> {
        let closed = self
            .store
            .with_slot(doc_id, |slot| Ok(self.disconnect_user(slot, user_id, false)))?;

        if closed > 0 {
            info!(doc_id = %doc_id, user = user_id, sessions_closed = closed, "User disconnected");
        }
        Ok(closed)
    }

    /// Sessions with no activity for longer than `max_idle`, for an external reaper
    pub fn stale_sessions(&self, max_idle: Duration) -> Vec<SessionId> {
        let cutoff = idle_cutoff(max_idle);
        self.store
            .ids()
            .iter()
            .filter_map(|id| {
                self.store
                    .with_slot(id, |slot| Ok(slot.sessions.idle_since(cutoff)))
                    .ok()
            })
            .flatten()
            .collect()
    }

    // Caller holds the slot lock.
    fn disconnect_user(&self, slot: &mut DocumentSlot, user_id: &str, revoked: bool) -> usize {
        let doc_id = slot.document.id().clone();
        let mut closed = 0;

        for session_id in slot.sessions.sessions_of(user_id) {
            let entry = match self.sessions.unregister(&mut slot.sessions, &session_id) {
                Some(entry) => entry,
                None => continue,
            };

            if revoked {
                let notice = Event::new(
                    doc_id.clone(),
                    EventKind::AccessRevoked {
                        user_id: user_id.to_string(),
                    },
                );
                self.router.send_to(&session_id, &entry.sender, notice);
            }

            let event = Event::new(
                doc_id.clone(),
                EventKind::UserLeft {
                    user_id: entry.session.user_id.clone(),
                    user_name: entry.session.user_name.clone(),
                },
            );
            drop(entry);
            self.router.publish(&slot.sessions, &event, None);
            closed += 1;
        }

        closed
    }

    fn check_content(&self, content: &str) -> Result<()> {
        if content.len() > self.config.max_content_bytes {
            return Err(Error::InvalidInput(format!(
                "Content size exceeds limit: {} > {}",
                content.len(),
                self.config.max_content_bytes
            )));
        }
        Ok(())
    }

    // Caller holds the slot lock, or the vacant map entry on create.
    fn persist(&self, document: &Document) {
        if let Some(queue) = &self.persistence {
            queue.enqueue(document.clone());
        }
    }
}

impl Default for CollaborationService {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn require_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::InvalidInput("User ID cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::TryRecvError;
    use crate::document::SuggestionStatus;
    use crate::error::EntityKind;
    use crate::repository::RepositoryStats;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn service() -> CollaborationService {
        CollaborationService::default()
    }

    fn names(feed: &mut SessionFeed) -> Vec<&'static str> {
        feed.drain().iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_scenario_create_and_update() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();
        assert_eq!(doc.version(), 1);
        assert!(doc.versions().is_empty());

        let doc = svc.update_content(doc.id(), "u1", "v2").unwrap();
        assert_eq!(doc.version(), 2);
        assert_eq!(doc.versions().len(), 1);
        assert_eq!(doc.versions()[0].version, 1);
        assert_eq!(doc.versions()[0].content, "v1");
    }

    #[test]
    fn test_scenario_collaborator_writes() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();
        let id = doc.id().clone();
        svc.update_content(&id, "u1", "v2").unwrap();

        svc.add_collaborator(&id, "u1", "u2", Permission::Write).unwrap();
        let doc = svc.update_content(&id, "u2", "v3").unwrap();

        assert_eq!(doc.last_edited_by(), "u2");
        assert_eq!(doc.version(), 3);
    }

    #[test]
    fn test_scenario_stranger_is_denied() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "secret").unwrap();

        let err = svc.get_document(doc.id(), "u3").unwrap_err();
        assert_eq!(err, Error::AccessDenied);
        assert!(!err.to_string().contains("Plan"));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_stranger_denied_before_version_or_suggestion_lookup() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();

        assert_eq!(svc.restore_version(doc.id(), 42, "u3"), Err(Error::AccessDenied));
        assert_eq!(
            svc.accept_suggestion(doc.id(), "suggestion_x", "u3"),
            Err(Error::AccessDenied)
        );
        assert_eq!(svc.version_history(doc.id(), "u3"), Err(Error::AccessDenied));
        assert_eq!(
            svc.export_document(doc.id(), "u3", ExportFormat::Pdf),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn test_unknown_document_is_not_found() {
        let svc = service();
        let id = DocumentId::new("doc_nope").unwrap();
        assert_eq!(
            svc.update_content(&id, "u1", "x"),
            Err(Error::not_found(EntityKind::Document, "doc_nope"))
        );
        assert!(svc.join(&id, "u1", "Alice").is_err());
    }

    #[test]
    fn test_scenario_suggestion_lifecycle() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();
        let id = doc.id().clone();
        svc.add_collaborator(&id, "u1", "u2", Permission::Write).unwrap();

        let suggestion = svc
            .add_suggestion(&id, "u2", "Bob", SuggestionKind::Insert, "x", None)
            .unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Pending);

        let accepted = svc.accept_suggestion(&id, &suggestion.id, "u1").unwrap();
        assert_eq!(accepted.status, SuggestionStatus::Accepted);

        let before = svc.get_document(&id, "u1").unwrap();
        assert!(matches!(
            svc.accept_suggestion(&id, &suggestion.id, "u1"),
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(svc.get_document(&id, "u1").unwrap(), before);
    }

    #[test]
    fn test_scenario_remove_collaborator_disconnects() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();
        let id = doc.id().clone();
        svc.add_collaborator(&id, "u1", "u2", Permission::Write).unwrap();

        let mut owner = svc.join(&id, "u1", "Alice").unwrap();
        let mut bob = svc.join(&id, "u2", "Bob").unwrap();
        owner.feed.drain();
        bob.feed.drain();

        svc.remove_collaborator(&id, "u1", "u2").unwrap();

        assert!(matches!(
            bob.feed.try_recv().map(|e| e.kind),
            Ok(EventKind::AccessRevoked { .. })
        ));
        assert!(matches!(bob.feed.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(names(&mut owner.feed), vec!["user-left"]);

        assert!(svc.session(&bob.session.id).is_none());
        assert_eq!(svc.active_sessions(&id).unwrap().len(), 1);
        assert_eq!(svc.get_document(&id, "u2"), Err(Error::AccessDenied));
    }

    #[test]
    fn test_join_snapshots_permission() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Sheet, "u1", "").unwrap();
        let id = doc.id().clone();
        svc.add_collaborator(&id, "u1", "reader", Permission::Read).unwrap();

        let joined = svc.join(&id, "reader", "Reader").unwrap();
        assert!(!joined.session.can_edit);
        assert_eq!(joined.active_sessions.len(), 1);
        assert_eq!(joined.document.id(), &id);

        assert_eq!(svc.join(&id, "stranger", "S").unwrap_err(), Error::AccessDenied);
    }

    #[test]
    fn test_events_follow_mutation_order() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();
        let id = doc.id().clone();
        let mut watcher = svc.join(&id, "u1", "Alice").unwrap();

        svc.update_content(&id, "u1", "v2").unwrap();
        let comment = svc.add_comment(&id, "u1", "Alice", "why?", None).unwrap();
        svc.reply_to_comment(&id, &comment.id, "u1", "Alice", "because").unwrap();
        svc.resolve_comment(&id, &comment.id, "u1").unwrap();
        svc.restore_version(&id, 1, "u1").unwrap();

        assert_eq!(
            names(&mut watcher.feed),
            vec![
                "user-joined",
                "document-update",
                "comment-added",
                "comment-reply",
                "comment-resolved",
                "version-restored",
            ]
        );
    }

    #[test]
    fn test_reader_resolves_once() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();
        let id = doc.id().clone();
        svc.add_collaborator(&id, "u1", "author", Permission::Write).unwrap();
        svc.add_collaborator(&id, "u1", "reader", Permission::Read).unwrap();
        let comment = svc.add_comment(&id, "author", "Author", "why?", None).unwrap();

        let mut watcher = svc.join(&id, "u1", "Alice").unwrap();
        watcher.feed.drain();

        assert_eq!(
            svc.resolve_comment(&id, &comment.id, "stranger"),
            Err(Error::AccessDenied)
        );

        let resolved = svc.resolve_comment(&id, &comment.id, "reader").unwrap();
        assert_eq!(resolved.resolved_by.as_deref(), Some("reader"));
        let again = svc.resolve_comment(&id, &comment.id, "u1").unwrap();
        assert_eq!(again, resolved);

        assert_eq!(names(&mut watcher.feed), vec!["comment-resolved"]);
    }

    #[test]
    fn test_cursor_not_echoed_to_sender() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "").unwrap();
        let id = doc.id().clone();
        svc.add_collaborator(&id, "u1", "u2", Permission::Read).unwrap();

        let mut a = svc.join(&id, "u1", "Alice").unwrap();
        let mut b = svc.join(&id, "u2", "Bob").unwrap();
        a.feed.drain();
        b.feed.drain();

        assert!(svc.update_cursor(&a.session.id, serde_json::json!({ "offset": 4 })));

        assert!(a.feed.drain().is_empty());
        let events = b.feed.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].kind,
            EventKind::CursorUpdate { user_id, cursor, .. }
                if user_id == "u1" && cursor["offset"] == 4
        ));

        let sessions = svc.active_sessions(&id).unwrap();
        let alice = sessions.iter().find(|s| s.user_id == "u1").unwrap();
        assert_eq!(alice.cursor, Some(serde_json::json!({ "offset": 4 })));
    }

    #[test]
    fn test_unknown_session_operations_are_noops() {
        let svc = service();
        let ghost = SessionId::new("session_ghost");
        assert!(!svc.leave(&ghost));
        assert!(!svc.update_cursor(&ghost, serde_json::json!(1)));
    }

    #[test]
    fn test_leave_is_idempotent() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "").unwrap();
        let joined = svc.join(doc.id(), "u1", "Alice").unwrap();

        assert!(svc.leave(&joined.session.id));
        assert!(!svc.leave(&joined.session.id));
        assert!(svc.active_sessions(doc.id()).unwrap().is_empty());
    }

    #[test]
    fn test_force_disconnect_closes_all_user_sessions() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "").unwrap();
        let id = doc.id().clone();
        svc.add_collaborator(&id, "u1", "u2", Permission::Write).unwrap();

        let mut tab1 = svc.join(&id, "u2", "Bob").unwrap();
        let _tab2 = svc.join(&id, "u2", "Bob").unwrap();
        let _owner = svc.join(&id, "u1", "Alice").unwrap();

        assert_eq!(svc.force_disconnect(&id, "u2").unwrap(), 2);
        assert_eq!(svc.active_sessions(&id).unwrap().len(), 1);
        tab1.feed.drain();
        assert!(matches!(tab1.feed.try_recv(), Err(TryRecvError::Disconnected)));

        // access itself is untouched
        assert!(svc.get_document(&id, "u2").is_ok());
    }

    #[test]
    fn test_identical_update_still_broadcasts() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "same").unwrap();
        let mut feed = svc.join(doc.id(), "u1", "Alice").unwrap().feed;
        feed.drain();

        let after = svc.update_content(doc.id(), "u1", "same").unwrap();
        assert_eq!(after.version(), 1);
        assert_eq!(names(&mut feed), vec!["document-update"]);
    }

    #[test]
    fn test_content_limit() {
        let config = EngineConfig {
            max_content_bytes: 4,
            ..EngineConfig::default()
        };
        let svc = CollaborationService::new(config);

        assert!(matches!(
            svc.create_document("Big", DocumentType::Doc, "u1", "12345"),
            Err(Error::InvalidInput(_))
        ));
        let doc = svc.create_document("Small", DocumentType::Doc, "u1", "1234").unwrap();
        assert!(svc.update_content(doc.id(), "u1", "123456").is_err());
        assert_eq!(svc.get_document(doc.id(), "u1").unwrap().version(), 1);
    }

    #[test]
    fn test_list_documents_filters_by_access() {
        let svc = service();
        let mine = svc.create_document("Mine", DocumentType::Doc, "u1", "").unwrap();
        let shared = svc.create_document("Shared", DocumentType::Doc, "u2", "").unwrap();
        svc.create_document("Hidden", DocumentType::Doc, "u2", "").unwrap();
        svc.add_collaborator(shared.id(), "u2", "u1", Permission::Read).unwrap();

        let ids: Vec<DocumentId> = svc.list_documents("u1").into_iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(mine.id()));
        assert!(ids.contains(shared.id()));
    }

    #[test]
    fn test_export_ticket() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "").unwrap();
        let ticket = svc.export_document(doc.id(), "u1", ExportFormat::Html).unwrap();
        assert_eq!(ticket.url, format!("/api/documents/{}/export/html", doc.id()));
    }

    #[test]
    fn test_stale_sessions() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "").unwrap();
        let joined = svc.join(doc.id(), "u1", "Alice").unwrap();

        assert!(svc.stale_sessions(Duration::from_secs(60)).is_empty());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(svc.stale_sessions(Duration::from_millis(1)), vec![joined.session.id]);
    }

    #[test]
    fn test_stats() {
        let svc = service();
        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "").unwrap();
        let _joined = svc.join(doc.id(), "u1", "Alice").unwrap();

        let stats = svc.stats();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.session_count, 1);
        assert_eq!(stats.events_delivered, 1);
    }

    #[derive(Default)]
    struct RecordingRepository {
        saved: Mutex<Vec<Document>>,
    }

    #[async_trait]
    impl DocumentRepository for RecordingRepository {
        async fn save(&self, document: &Document) -> std::result::Result<(), RepositoryError> {
            self.saved.lock().push(document.clone());
            Ok(())
        }

        async fn load(&self, id: &DocumentId) -> std::result::Result<Option<Document>, RepositoryError> {
            Ok(self
                .saved
                .lock()
                .iter()
                .rev()
                .find(|d| d.id() == id)
                .cloned())
        }

        async fn list(&self) -> std::result::Result<Vec<DocumentId>, RepositoryError> {
            let mut ids: Vec<DocumentId> = self.saved.lock().iter().map(|d| d.id().clone()).collect();
            ids.sort();
            ids.dedup();
            Ok(ids)
        }

        async fn exists(&self, id: &DocumentId) -> std::result::Result<bool, RepositoryError> {
            Ok(self.saved.lock().iter().any(|d| d.id() == id))
        }

        async fn stats(&self) -> std::result::Result<RepositoryStats, RepositoryError> {
            Ok(RepositoryStats {
                document_count: self.list().await?.len(),
                total_size_bytes: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_write_through_in_commit_order() {
        let repo = Arc::new(RecordingRepository::default());
        let svc = CollaborationService::with_repository(EngineConfig::default(), repo.clone());

        let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "v1").unwrap();
        for n in 2..=5 {
            svc.update_content(doc.id(), "u1", &format!("v{}", n)).unwrap();
        }
        svc.flush().await;

        let versions: Vec<u64> = repo.saved.lock().iter().map(|d| d.version()).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writers_persist_in_commit_order() {
        for _ in 0..20 {
            let repo = Arc::new(RecordingRepository::default());
            let svc = Arc::new(CollaborationService::with_repository(
                EngineConfig::default(),
                repo.clone(),
            ));
            let doc = svc.create_document("Plan", DocumentType::Doc, "u1", "").unwrap();
            let id = doc.id().clone();

            let writers: Vec<_> = (0..4)
                .map(|w| {
                    let svc = svc.clone();
                    let id = id.clone();
                    std::thread::spawn(move || {
                        for n in 0..50 {
                            svc.update_content(&id, "u1", &format!("{}-{}", w, n)).unwrap();
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }
            svc.flush().await;

            let versions: Vec<u64> = repo.saved.lock().iter().map(|d| d.version()).collect();
            assert_eq!(versions.len(), 201);
            assert!(versions.windows(2).all(|w| w[0] < w[1]), "saved out of order: {:?}", versions);

            let head = svc.get_document(&id, "u1").unwrap();
            assert_eq!(versions.last().copied(), Some(head.version()));
            assert_eq!(head.version(), 201);
        }
    }

    #[tokio::test]
    async fn test_hydrate_restores_documents() {
        let repo = Arc::new(RecordingRepository::default());
        let id = {
            let svc = CollaborationService::with_repository(EngineConfig::default(), repo.clone());
            let doc = svc.create_document("Plan", DocumentType::Slide, "u1", "v1").unwrap();
            svc.update_content(doc.id(), "u1", "v2").unwrap();
            svc.flush().await;
            doc.id().clone()
        };

        let fresh = CollaborationService::with_repository(EngineConfig::default(), repo);
        assert_eq!(fresh.hydrate().await.unwrap(), 1);

        let doc = fresh.get_document(&id, "u1").unwrap();
        assert_eq!(doc.content(), "v2");
        assert_eq!(doc.versions().len(), 1);
        assert_eq!(fresh.hydrate().await.unwrap(), 0);
    }
}
