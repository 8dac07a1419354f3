//! Broadcast event taxonomy

use crate::document::{now_millis, Comment, DocumentId, DocumentPatch, Reply, Suggestion};
use serde::{Deserialize, Serialize};

/// A state change delivered to the sessions attached to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub doc_id: DocumentId,
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(doc_id: DocumentId, kind: EventKind) -> Self {
        Self {
            doc_id,
            timestamp: now_millis(),
            kind,
        }
    }

    /// Wire name of the event type
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EventKind {
    DocumentUpdate {
        updates: DocumentPatch,
        version: u64,
        user_id: String,
    },
    UserJoined {
        user_id: String,
        user_name: String,
        can_edit: bool,
    },
    UserLeft {
        user_id: String,
        user_name: String,
    },
    CursorUpdate {
        user_id: String,
        user_name: String,
        cursor: serde_json::Value,
    },
    CommentAdded {
        comment: Comment,
    },
    CommentReply {
        comment_id: String,
        reply: Reply,
    },
    CommentResolved {
        comment_id: String,
    },
    SuggestionAdded {
        suggestion: Suggestion,
    },
    SuggestionAccepted {
        suggestion_id: String,
    },
    SuggestionRejected {
        suggestion_id: String,
    },
    VersionRestored {
        version_number: u64,
        content: String,
    },
    /// Sent only to sessions that are being closed because access was revoked
    AccessRevoked {
        user_id: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DocumentUpdate { .. } => "document-update",
            EventKind::UserJoined { .. } => "user-joined",
            EventKind::UserLeft { .. } => "user-left",
            EventKind::CursorUpdate { .. } => "cursor-update",
            EventKind::CommentAdded { .. } => "comment-added",
            EventKind::CommentReply { .. } => "comment-reply",
            EventKind::CommentResolved { .. } => "comment-resolved",
            EventKind::SuggestionAdded { .. } => "suggestion-added",
            EventKind::SuggestionAccepted { .. } => "suggestion-accepted",
            EventKind::SuggestionRejected { .. } => "suggestion-rejected",
            EventKind::VersionRestored { .. } => "version-restored",
            EventKind::AccessRevoked { .. } => "access-revoked",
        }
    }
}
