//! Session registry - live connections per document
//!
//! Sessions are ephemeral. Each document's sessions live in a [`SessionTable`]
//! stored next to the document inside its slot, so joins, leaves and cursor
//! moves are serialized with document mutations. The [`SessionRegistry`]
//! keeps the derived `session -> document` index used by `leave` and
//! `update_cursor`, which only know the session id.

use crate::broadcast::EventSender;
use crate::document::{generate_id, now_millis, DocumentId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(generate_id("session"))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user's live connection to one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub doc_id: DocumentId,
    pub user_id: String,
    pub user_name: String,
    /// Permission snapshot taken at join time
    pub can_edit: bool,
    pub connected_at: u64,
    pub last_activity: u64,
    pub cursor: Option<serde_json::Value>,
}

/// Public view of a session returned by `active_sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub session_id: SessionId,
    pub user_id: String,
    pub user_name: String,
    pub can_edit: bool,
    pub cursor: Option<serde_json::Value>,
    pub connected_at: u64,
}

impl From<&Session> for ActiveSession {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            user_name: session.user_name.clone(),
            can_edit: session.can_edit,
            cursor: session.cursor.clone(),
            connected_at: session.connected_at,
        }
    }
}

pub(crate) struct SessionEntry {
    pub(crate) session: Session,
    pub(crate) sender: EventSender,
}

/// Sessions attached to a single document
#[derive(Default)]
pub struct SessionTable {
    entries: HashMap<SessionId, SessionEntry>,
}

impl SessionTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.entries.get(id).map(|e| &e.session)
    }

    /// Active sessions ordered by connection time
    pub fn active(&self) -> Vec<ActiveSession> {
        let mut sessions: Vec<ActiveSession> =
            self.entries.values().map(|e| ActiveSession::from(&e.session)).collect();
        sessions.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    pub(crate) fn sessions_of(&self, user_id: &str) -> Vec<SessionId> {
        self.entries
            .values()
            .filter(|e| e.session.user_id == user_id)
            .map(|e| e.session.id.clone())
            .collect()
    }

    pub(crate) fn idle_since(&self, cutoff: u64) -> Vec<SessionId> {
        self.entries
            .values()
            .filter(|e| e.session.last_activity < cutoff)
            .map(|e| e.session.id.clone())
            .collect()
    }

    pub(crate) fn senders(&self) -> impl Iterator<Item = (&SessionId, &EventSender)> {
        self.entries.iter().map(|(id, e)| (id, &e.sender))
    }

    fn get_mut(&mut self, id: &SessionId) -> Option<&mut SessionEntry> {
        self.entries.get_mut(id)
    }
}

/// Index of live sessions across all documents
pub struct SessionRegistry {
    index: DashMap<SessionId, DocumentId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            index: DashMap::new(),
        }
    }

    /// Document a session is attached to, if it is still live
    pub fn document_of(&self, session_id: &SessionId) -> Option<DocumentId> {
        self.index.get(session_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub(crate) fn register(
        &self,
        table: &mut SessionTable,
        session: Session,
        sender: EventSender,
    ) {
        self.index.insert(session.id.clone(), session.doc_id.clone());
        table
            .entries
            .insert(session.id.clone(), SessionEntry { session, sender });
    }

    /// Remove a session; dropping the returned entry closes its feed
    pub(crate) fn unregister(
        &self,
        table: &mut SessionTable,
        session_id: &SessionId,
    ) -> Option<SessionEntry> {
        let entry = table.entries.remove(session_id)?;
        self.index.remove(session_id);
        Some(entry)
    }

    /// Record a cursor move; returns the updated session
    pub(crate) fn move_cursor(
        &self,
        table: &mut SessionTable,
        session_id: &SessionId,
        cursor: serde_json::Value,
    ) -> Option<Session> {
        let entry = table.get_mut(session_id)?;
        entry.session.cursor = Some(cursor);
        entry.session.last_activity = now_millis();
        Some(entry.session.clone())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cutoff timestamp for sessions idle longer than `max_idle`
pub(crate) fn idle_cutoff(max_idle: Duration) -> u64 {
    now_millis().saturating_sub(max_idle.as_millis() as u64)
}
