//! Console command types

use scribe_core::{
    DocumentId, DocumentType, ExportFormat, Permission, SelectionRange, SessionId, SuggestionKind,
};

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub document_id: Option<DocumentId>,
}

/// All supported console commands
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// AS <userId> [userName]
    As {
        user_id: String,
        user_name: Option<String>,
    },

    /// CREATE <title> [TYPE doc|sheet|slide] [CONTENT <text>]
    Create {
        title: String,
        doc_type: DocumentType,
        content: String,
    },

    /// GET <doc>
    Get,

    /// LIST
    List,

    /// UPDATE <doc> <content>
    Update { content: String },

    /// TITLE <doc> <title>
    Title { title: String },

    /// SHARE <doc> <user> [read|write]
    Share {
        user_id: String,
        permission: Permission,
    },

    /// UNSHARE <doc> <user>
    Unshare { user_id: String },

    /// COMMENT <doc> [AT <start> <end>] <text>
    Comment {
        selection: Option<SelectionRange>,
        text: String,
    },

    /// REPLY <doc> <comment> <text>
    Reply { comment_id: String, text: String },

    /// RESOLVE <doc> <comment>
    Resolve { comment_id: String },

    /// SUGGEST <doc> <insert|delete|replace> [AT <start> <end>] <content>
    Suggest {
        suggestion_kind: SuggestionKind,
        selection: Option<SelectionRange>,
        content: String,
    },

    /// ACCEPT <doc> <suggestion>
    Accept { suggestion_id: String },

    /// REJECT <doc> <suggestion>
    Reject { suggestion_id: String },

    /// HISTORY <doc>
    History,

    /// RESTORE <doc> <version>
    Restore { version: u64 },

    /// JOIN <doc>
    Join,

    /// LEAVE <session>
    Leave { session_id: SessionId },

    /// CURSOR <session> <json>
    Cursor {
        session_id: SessionId,
        cursor: serde_json::Value,
    },

    /// WHO <doc>
    Who,

    /// KICK <doc> <user>
    Kick { user_id: String },

    /// EXPORT <doc> [pdf|docx|html]
    Export { format: ExportFormat },

    /// EVENTS [session]
    Events { session_id: Option<SessionId> },

    /// INFO
    Info,

    /// PING
    Ping,

    /// QUIT
    Quit,
}

impl Command {
    /// A command that targets a document
    pub fn on(document_id: DocumentId, kind: CommandKind) -> Self {
        Command {
            kind,
            document_id: Some(document_id),
        }
    }

    /// A command with no target document
    pub fn global(kind: CommandKind) -> Self {
        Command {
            kind,
            document_id: None,
        }
    }

    /// Upper-case command name, for logging
    pub fn name(&self) -> &'static str {
        match &self.kind {
            CommandKind::As { .. } => "AS",
            CommandKind::Create { .. } => "CREATE",
            CommandKind::Get => "GET",
            CommandKind::List => "LIST",
            CommandKind::Update { .. } => "UPDATE",
            CommandKind::Title { .. } => "TITLE",
            CommandKind::Share { .. } => "SHARE",
            CommandKind::Unshare { .. } => "UNSHARE",
            CommandKind::Comment { .. } => "COMMENT",
            CommandKind::Reply { .. } => "REPLY",
            CommandKind::Resolve { .. } => "RESOLVE",
            CommandKind::Suggest { .. } => "SUGGEST",
            CommandKind::Accept { .. } => "ACCEPT",
            CommandKind::Reject { .. } => "REJECT",
            CommandKind::History => "HISTORY",
            CommandKind::Restore { .. } => "RESTORE",
            CommandKind::Join => "JOIN",
            CommandKind::Leave { .. } => "LEAVE",
            CommandKind::Cursor { .. } => "CURSOR",
            CommandKind::Who => "WHO",
            CommandKind::Kick { .. } => "KICK",
            CommandKind::Export { .. } => "EXPORT",
            CommandKind::Events { .. } => "EVENTS",
            CommandKind::Info => "INFO",
            CommandKind::Ping => "PING",
            CommandKind::Quit => "QUIT",
        }
    }

    /// Whether the command can run before `AS`
    pub fn is_anonymous(&self) -> bool {
        matches!(
            self.kind,
            CommandKind::As { .. } | CommandKind::Info | CommandKind::Ping | CommandKind::Quit
        )
    }
}
