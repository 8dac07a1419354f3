//! Document types and operations
//!
//! A [`Document`] owns its content, access list, comments, suggestions and
//! version log. Every mutating method checks the caller's access first and
//! either applies completely or returns an error without touching state.

use crate::error::{EntityKind, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Current wall-clock time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Server-generated identifier with a readable prefix
pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Document identifier - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh, unguessable document id
    pub fn generate() -> Self {
        Self(generate_id("doc"))
    }

    /// Wrap an existing id, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidInput("Document ID cannot be empty".into()));
        }

        if id.len() > 512 {
            return Err(Error::InvalidInput("Document ID exceeds 512 bytes".into()));
        }

        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-') {
            return Err(Error::InvalidInput(
                "Document ID must match pattern [a-zA-Z0-9:_-]+".into(),
            ));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of document; the engine treats content identically for all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[default]
    Doc,
    Sheet,
    Slide,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::Doc => write!(f, "doc"),
            DocumentType::Sheet => write!(f, "sheet"),
            DocumentType::Slide => write!(f, "slide"),
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "doc" | "document" => Ok(DocumentType::Doc),
            "sheet" | "spreadsheet" => Ok(DocumentType::Sheet),
            "slide" | "slides" => Ok(DocumentType::Slide),
            _ => Err(Error::InvalidInput(format!("Unknown document type: {}", s))),
        }
    }
}

/// Permission granted to a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    #[default]
    Write,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::Write => write!(f, "write"),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" | "r" => Ok(Permission::Read),
            "write" | "w" => Ok(Permission::Write),
            _ => Err(Error::InvalidInput(format!("Unknown permission: {}", s))),
        }
    }
}

/// Effective access a user has on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    None,
    Read,
    Write,
}

/// Kind of tracked change proposed by a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Insert,
    Delete,
    Replace,
}

impl std::fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestionKind::Insert => write!(f, "insert"),
            SuggestionKind::Delete => write!(f, "delete"),
            SuggestionKind::Replace => write!(f, "replace"),
        }
    }
}

impl std::str::FromStr for SuggestionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(SuggestionKind::Insert),
            "delete" => Ok(SuggestionKind::Delete),
            "replace" => Ok(SuggestionKind::Replace),
            _ => Err(Error::InvalidInput(format!("Unknown suggestion type: {}", s))),
        }
    }
}

/// Lifecycle state of a suggestion; only `Pending` may transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestionStatus::Pending => write!(f, "pending"),
            SuggestionStatus::Accepted => write!(f, "accepted"),
            SuggestionStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Character range a comment or suggestion is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: u64,
    pub end: u64,
}

impl SelectionRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "Selection start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    pub permission: Permission,
    pub added_at: u64,
}

/// Snapshot of the content that was current before a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: u64,
    pub content: String,
    pub saved_at: u64,
    pub saved_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub selection: Option<SelectionRange>,
    pub replies: Vec<Reply>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub content: String,
    pub selection: Option<SelectionRange>,
    pub status: SuggestionStatus,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<u64>,
}

/// Partial update applied through [`Document::apply_patch`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Listing entry that omits content and history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: DocumentType,
    pub owner_id: String,
    pub version: u64,
    pub updated_at: u64,
    pub last_edited_by: String,
}

/// A collaboratively edited document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    id: DocumentId,
    title: String,
    #[serde(rename = "type")]
    kind: DocumentType,
    owner_id: String,
    content: String,
    collaborators: Vec<Collaborator>,
    version: u64,
    versions: Vec<VersionEntry>,
    comments: Vec<Comment>,
    suggestions: Vec<Suggestion>,
    created_at: u64,
    updated_at: u64,
    last_edited_by: String,
}

impl Document {
    /// Create a new document at version 1 with empty collections
    pub fn new(
        title: impl Into<String>,
        kind: DocumentType,
        owner_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let owner_id = owner_id.into();
        let now = now_millis();

        Self {
            id: DocumentId::generate(),
            title: title.into(),
            kind,
            owner_id: owner_id.clone(),
            content: content.into(),
            collaborators: Vec::new(),
            version: 1,
            versions: Vec::new(),
            comments: Vec::new(),
            suggestions: Vec::new(),
            created_at: now,
            updated_at: now,
            last_edited_by: owner_id,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> DocumentType {
        self.kind
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn collaborators(&self) -> &[Collaborator] {
        &self.collaborators
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn versions(&self) -> &[VersionEntry] {
        &self.versions
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    pub fn last_edited_by(&self) -> &str {
        &self.last_edited_by
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            kind: self.kind,
            owner_id: self.owner_id.clone(),
            version: self.version,
            updated_at: self.updated_at,
            last_edited_by: self.last_edited_by.clone(),
        }
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    /// Effective access for a user; the owner always has write
    pub fn access_for(&self, user_id: &str) -> Access {
        if self.is_owner(user_id) {
            return Access::Write;
        }

        match self.collaborators.iter().find(|c| c.user_id == user_id) {
            Some(c) if c.permission == Permission::Write => Access::Write,
            Some(_) => Access::Read,
            None => Access::None,
        }
    }

    pub fn can_read(&self, user_id: &str) -> bool {
        self.access_for(user_id) >= Access::Read
    }

    pub fn can_write(&self, user_id: &str) -> bool {
        self.access_for(user_id) == Access::Write
    }

    pub fn ensure_readable(&self, user_id: &str) -> Result<()> {
        if self.can_read(user_id) {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    pub fn ensure_writable(&self, user_id: &str) -> Result<()> {
        match self.access_for(user_id) {
            Access::Write => Ok(()),
            Access::Read => Err(Error::forbidden("write permission required")),
            Access::None => Err(Error::AccessDenied),
        }
    }

    pub fn ensure_owner(&self, user_id: &str, action: &str) -> Result<()> {
        self.ensure_readable(user_id)?;
        if self.is_owner(user_id) {
            Ok(())
        } else {
            Err(Error::forbidden(format!("only the owner can {}", action)))
        }
    }

    /// Apply a title and/or content change.
    ///
    /// Returns `true` if the content changed and a version entry was logged.
    /// Identical content still refreshes `updated_at` and `last_edited_by`.
    pub fn apply_patch(&mut self, caller: &str, patch: DocumentPatch) -> Result<bool> {
        self.ensure_writable(caller)?;

        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput("Title cannot be empty".into()));
            }
        }

        if let Some(title) = patch.title {
            self.title = title;
        }

        let changed = match patch.content {
            Some(content) if content != self.content => {
                self.commit_content(content);
                true
            }
            _ => false,
        };

        self.touch(caller);
        Ok(changed)
    }

    /// Replace the content; see [`Document::apply_patch`]
    pub fn update_content(&mut self, caller: &str, content: impl Into<String>) -> Result<bool> {
        self.apply_patch(caller, DocumentPatch::content(content))
    }

    /// Grant access. Re-adding an existing collaborator or the owner is a no-op.
    pub fn add_collaborator(
        &mut self,
        caller: &str,
        user_id: &str,
        permission: Permission,
    ) -> Result<bool> {
        self.ensure_owner(caller, "add collaborators")?;

        if user_id.is_empty() {
            return Err(Error::InvalidInput("Collaborator ID cannot be empty".into()));
        }

        if self.is_owner(user_id) || self.collaborators.iter().any(|c| c.user_id == user_id) {
            return Ok(false);
        }

        self.collaborators.push(Collaborator {
            user_id: user_id.to_string(),
            permission,
            added_at: now_millis(),
        });
        Ok(true)
    }

    /// Revoke access. Removing a non-member is a no-op.
    pub fn remove_collaborator(&mut self, caller: &str, user_id: &str) -> Result<bool> {
        self.ensure_owner(caller, "remove collaborators")?;

        let before = self.collaborators.len();
        self.collaborators.retain(|c| c.user_id != user_id);
        Ok(self.collaborators.len() != before)
    }

    pub fn add_comment(
        &mut self,
        caller: &str,
        user_name: &str,
        text: &str,
        selection: Option<SelectionRange>,
    ) -> Result<Comment> {
        self.ensure_readable(caller)?;
        require_text(text, "Comment")?;

        let comment = Comment {
            id: generate_id("comment"),
            user_id: caller.to_string(),
            user_name: user_name.to_string(),
            text: text.to_string(),
            selection,
            replies: Vec::new(),
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: now_millis(),
        };

        self.comments.push(comment.clone());
        Ok(comment)
    }

    pub fn reply_to_comment(
        &mut self,
        comment_id: &str,
        caller: &str,
        user_name: &str,
        text: &str,
    ) -> Result<Reply> {
        self.ensure_readable(caller)?;
        require_text(text, "Reply")?;

        let comment = self.comment_mut(comment_id)?;
        let reply = Reply {
            id: generate_id("reply"),
            user_id: caller.to_string(),
            user_name: user_name.to_string(),
            text: text.to_string(),
            created_at: now_millis(),
        };

        comment.replies.push(reply.clone());
        Ok(reply)
    }

    /// Mark a comment resolved. Any reader may resolve.
    ///
    /// Returns the comment and whether this call changed it.
    pub fn resolve_comment(&mut self, comment_id: &str, caller: &str) -> Result<(Comment, bool)> {
        self.ensure_readable(caller)?;

        let comment = self.comment_mut(comment_id)?;
        if comment.resolved {
            return Ok((comment.clone(), false));
        }

        comment.resolved = true;
        comment.resolved_by = Some(caller.to_string());
        comment.resolved_at = Some(now_millis());
        Ok((comment.clone(), true))
    }

    /// Propose a tracked change. Requires write permission.
    pub fn add_suggestion(
        &mut self,
        caller: &str,
        user_name: &str,
        kind: SuggestionKind,
        content: &str,
        selection: Option<SelectionRange>,
    ) -> Result<Suggestion> {
        self.ensure_writable(caller)?;

        let suggestion = Suggestion {
            id: generate_id("suggestion"),
            user_id: caller.to_string(),
            user_name: user_name.to_string(),
            kind,
            content: content.to_string(),
            selection,
            status: SuggestionStatus::Pending,
            created_at: now_millis(),
            accepted_by: None,
            accepted_at: None,
            rejected_by: None,
            rejected_at: None,
        };

        self.suggestions.push(suggestion.clone());
        Ok(suggestion)
    }

    pub fn accept_suggestion(&mut self, suggestion_id: &str, caller: &str) -> Result<Suggestion> {
        self.settle_suggestion(suggestion_id, caller, SuggestionStatus::Accepted)
    }

    pub fn reject_suggestion(&mut self, suggestion_id: &str, caller: &str) -> Result<Suggestion> {
        self.settle_suggestion(suggestion_id, caller, SuggestionStatus::Rejected)
    }

    // Accepting records the decision only; content stays opaque to the engine.
    fn settle_suggestion(
        &mut self,
        suggestion_id: &str,
        caller: &str,
        target: SuggestionStatus,
    ) -> Result<Suggestion> {
        let action = match target {
            SuggestionStatus::Rejected => "reject suggestions",
            _ => "accept suggestions",
        };
        self.ensure_owner(caller, action)?;

        let suggestion = self
            .suggestions
            .iter_mut()
            .find(|s| s.id == suggestion_id)
            .ok_or_else(|| Error::not_found(EntityKind::Suggestion, suggestion_id))?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(Error::InvalidTransition {
                from: suggestion.status.to_string(),
                to: target.to_string(),
            });
        }

        let now = now_millis();
        suggestion.status = target;
        match target {
            SuggestionStatus::Rejected => {
                suggestion.rejected_by = Some(caller.to_string());
                suggestion.rejected_at = Some(now);
            }
            _ => {
                suggestion.accepted_by = Some(caller.to_string());
                suggestion.accepted_at = Some(now);
            }
        }

        Ok(suggestion.clone())
    }

    pub fn version_history(&self, caller: &str) -> Result<&[VersionEntry]> {
        self.ensure_readable(caller)?;
        Ok(&self.versions)
    }

    /// Restore an archived version as a new forward write.
    ///
    /// The current head is always archived and the version always advances,
    /// even when the restored content equals the head. Returns the restored
    /// content.
    pub fn restore_version(&mut self, version: u64, caller: &str) -> Result<String> {
        self.ensure_writable(caller)?;

        let content = self
            .versions
            .iter()
            .find(|v| v.version == version)
            .map(|v| v.content.clone())
            .ok_or_else(|| Error::not_found(EntityKind::Version, version.to_string()))?;

        self.commit_content(content.clone());
        self.touch(caller);
        Ok(content)
    }

    // Archive the head, then advance. Keeps versions[i].version == i + 1.
    fn commit_content(&mut self, content: String) {
        let previous = std::mem::replace(&mut self.content, content);
        self.versions.push(VersionEntry {
            version: self.version,
            content: previous,
            saved_at: self.updated_at,
            saved_by: self.last_edited_by.clone(),
        });
        self.version += 1;
    }

    fn touch(&mut self, caller: &str) {
        self.updated_at = now_millis();
        self.last_edited_by = caller.to_string();
    }

    fn comment_mut(&mut self, comment_id: &str) -> Result<&mut Comment> {
        self.comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| Error::not_found(EntityKind::Comment, comment_id))
    }
}

fn require_text(text: &str, what: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} text cannot be empty", what)));
    }
    Ok(())
}
