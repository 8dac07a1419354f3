//! Command handler - runs console commands against a collaboration service

use crate::command::{Command, CommandKind};
use crate::error::{ProtocolError, ProtocolResult};
use crate::parser::Parser;
use crate::response::Response;
use scribe_core::{
    CollaborationService, DocumentId, DocumentPatch, EntityKind, Error, SessionFeed, SessionId,
    TryRecvError,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The user a handler acts as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
}

/// Handles one console client
///
/// Holds the client's identity and the feeds of every session it has
/// joined. `EVENTS` drains those feeds.
pub struct CommandHandler {
    pub client_id: String,
    service: Arc<CollaborationService>,
    parser: Parser,
    identity: Option<Identity>,
    feeds: HashMap<SessionId, SessionFeed>,
}

impl CommandHandler {
    pub fn new(client_id: impl Into<String>, service: Arc<CollaborationService>) -> Self {
        Self {
            client_id: client_id.into(),
            service,
            parser: Parser::new(),
            identity: None,
            feeds: HashMap::new(),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Sessions this client has joined and not yet left
    pub fn open_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.feeds.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Process incoming data and return responses
    pub fn process(&mut self, data: &[u8]) -> Vec<Response> {
        let mut responses = Vec::new();

        if let Err(e) = self.parser.feed(data) {
            responses.push(e.into());
            return responses;
        }

        loop {
            match self.parser.parse() {
                Ok(Some(cmd)) => responses.push(self.execute(cmd)),
                Ok(None) => break,
                Err(e) => responses.push(e.into()),
            }
        }

        responses
    }

    /// Parse and run a single line
    pub fn execute_line(&mut self, line: &str) -> Response {
        match Parser::parse_line(line) {
            Ok(cmd) => self.execute(cmd),
            Err(e) => e.into(),
        }
    }

    /// Run a parsed command
    pub fn execute(&mut self, cmd: Command) -> Response {
        debug!(client = %self.client_id, cmd = cmd.name(), "Processing command");

        match self.dispatch(cmd) {
            Ok(response) => response,
            Err(e) => {
                debug!(client = %self.client_id, code = e.code(), error = %e, "Command failed");
                e.into()
            }
        }
    }

    fn dispatch(&mut self, cmd: Command) -> ProtocolResult<Response> {
        if !cmd.is_anonymous() && self.identity.is_none() {
            return Err(ProtocolError::NoIdentity);
        }

        let svc = self.service.clone();
        let doc = cmd.document_id;

        match cmd.kind {
            CommandKind::As { user_id, user_name } => Ok(self.handle_as(user_id, user_name)),
            CommandKind::Ping => Ok(Response::pong()),
            CommandKind::Quit => {
                self.cleanup();
                Ok(Response::ok_with_message("Goodbye"))
            }
            CommandKind::Info => Ok(self.handle_info()),

            CommandKind::Create {
                title,
                doc_type,
                content,
            } => {
                let me = self.me()?;
                let document = svc.create_document(&title, doc_type, &me.user_id, &content)?;
                Ok(Response::json(&document.summary()))
            }
            CommandKind::Get => {
                let document = svc.get_document(&target(doc)?, &self.me()?.user_id)?;
                Ok(Response::json(&document))
            }
            CommandKind::List => Ok(Response::json(&svc.list_documents(&self.me()?.user_id))),
            CommandKind::Update { content } => {
                let document = svc.update_content(&target(doc)?, &self.me()?.user_id, &content)?;
                Ok(Response::json(&document.summary()))
            }
            CommandKind::Title { title } => {
                let document = svc.update_document(
                    &target(doc)?,
                    &self.me()?.user_id,
                    DocumentPatch::title(title),
                )?;
                Ok(Response::json(&document.summary()))
            }
            CommandKind::Share {
                user_id,
                permission,
            } => {
                let document =
                    svc.add_collaborator(&target(doc)?, &self.me()?.user_id, &user_id, permission)?;
                Ok(Response::json(&document.collaborators()))
            }
            CommandKind::Unshare { user_id } => {
                let document = svc.remove_collaborator(&target(doc)?, &self.me()?.user_id, &user_id)?;
                Ok(Response::json(&document.collaborators()))
            }
            CommandKind::Comment { selection, text } => {
                let me = self.me()?;
                let comment =
                    svc.add_comment(&target(doc)?, &me.user_id, &me.user_name, &text, selection)?;
                Ok(Response::json(&comment))
            }
            CommandKind::Reply { comment_id, text } => {
                let me = self.me()?;
                let reply = svc.reply_to_comment(
                    &target(doc)?,
                    &comment_id,
                    &me.user_id,
                    &me.user_name,
                    &text,
                )?;
                Ok(Response::json(&reply))
            }
            CommandKind::Resolve { comment_id } => {
                let comment = svc.resolve_comment(&target(doc)?, &comment_id, &self.me()?.user_id)?;
                Ok(Response::json(&comment))
            }
            CommandKind::Suggest {
                suggestion_kind,
                selection,
                content,
            } => {
                let me = self.me()?;
                let suggestion = svc.add_suggestion(
                    &target(doc)?,
                    &me.user_id,
                    &me.user_name,
                    suggestion_kind,
                    &content,
                    selection,
                )?;
                Ok(Response::json(&suggestion))
            }
            CommandKind::Accept { suggestion_id } => {
                let suggestion =
                    svc.accept_suggestion(&target(doc)?, &suggestion_id, &self.me()?.user_id)?;
                Ok(Response::json(&suggestion))
            }
            CommandKind::Reject { suggestion_id } => {
                let suggestion =
                    svc.reject_suggestion(&target(doc)?, &suggestion_id, &self.me()?.user_id)?;
                Ok(Response::json(&suggestion))
            }
            CommandKind::History => {
                let versions = svc.version_history(&target(doc)?, &self.me()?.user_id)?;
                Ok(Response::json(&versions))
            }
            CommandKind::Restore { version } => {
                let document = svc.restore_version(&target(doc)?, version, &self.me()?.user_id)?;
                Ok(Response::json(&document.summary()))
            }
            CommandKind::Join => self.handle_join(target(doc)?),
            CommandKind::Leave { session_id } => {
                if self.feeds.remove(&session_id).is_none() {
                    return Err(Error::not_found(EntityKind::Session, session_id.as_str()).into());
                }
                svc.leave(&session_id);
                Ok(Response::ok_with_message(format!("Left {}", session_id)))
            }
            CommandKind::Cursor { session_id, cursor } => {
                if !self.feeds.contains_key(&session_id) || !svc.update_cursor(&session_id, cursor) {
                    return Err(Error::not_found(EntityKind::Session, session_id.as_str()).into());
                }
                Ok(Response::ok())
            }
            CommandKind::Who => {
                let id = target(doc)?;
                svc.get_document(&id, &self.me()?.user_id)?;
                Ok(Response::json(&svc.active_sessions(&id)?))
            }
            CommandKind::Kick { user_id } => {
                let id = target(doc)?;
                let me = self.me()?;
                svc.get_document(&id, &me.user_id)?
                    .ensure_owner(&me.user_id, "disconnect users")?;
                let closed = svc.force_disconnect(&id, &user_id)?;
                Ok(Response::ok_with_message(format!("{} session(s) closed", closed)))
            }
            CommandKind::Export { format } => {
                let ticket = svc.export_document(&target(doc)?, &self.me()?.user_id, format)?;
                Ok(Response::json(&ticket))
            }
            CommandKind::Events { session_id } => self.handle_events(session_id),
        }
    }

    fn handle_as(&mut self, user_id: String, user_name: Option<String>) -> Response {
        if self.identity.as_ref().map(|i| &i.user_id) != Some(&user_id) {
            self.cleanup();
        }

        let user_name = user_name.unwrap_or_else(|| user_id.clone());
        info!(client = %self.client_id, user = %user_id, "Client identified");
        let message = format!("Acting as {} ({})", user_id, user_name);
        self.identity = Some(Identity { user_id, user_name });
        Response::ok_with_message(message)
    }

    fn handle_join(&mut self, doc: DocumentId) -> ProtocolResult<Response> {
        let me = self.me()?;
        let outcome = self.service.join(&doc, &me.user_id, &me.user_name)?;

        let body = serde_json::json!({
            "session": outcome.session,
            "document": outcome.document.summary(),
            "activeSessions": outcome.active_sessions,
        });
        self.feeds.insert(outcome.session.id.clone(), outcome.feed);
        Ok(Response::Json(body))
    }

    fn handle_events(&mut self, session_id: Option<SessionId>) -> ProtocolResult<Response> {
        let targets = match session_id {
            Some(id) if self.feeds.contains_key(&id) => vec![id],
            Some(id) => return Err(Error::not_found(EntityKind::Session, id.as_str()).into()),
            None => self.open_sessions(),
        };

        let mut events = Vec::new();
        for id in targets {
            let closed = match self.feeds.get_mut(&id) {
                Some(feed) => drain_feed(feed, &mut events),
                None => false,
            };
            if closed {
                self.feeds.remove(&id);
                debug!(client = %self.client_id, session = %id, "Session feed closed");
            }
        }

        Ok(Response::Json(serde_json::Value::Array(events)))
    }

    fn handle_info(&self) -> Response {
        let stats = self.service.stats();
        let info = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "clientId": self.client_id,
            "identity": self.identity,
            "documents": stats.document_count,
            "sessions": stats.session_count,
            "eventsDelivered": stats.events_delivered,
            "eventsDropped": stats.events_dropped,
            "openSessions": self.open_sessions(),
        });
        Response::Json(info)
    }

    fn me(&self) -> ProtocolResult<Identity> {
        self.identity.clone().ok_or(ProtocolError::NoIdentity)
    }

    /// Leave every session this client holds
    pub fn cleanup(&mut self) {
        for (session_id, _) in self.feeds.drain() {
            self.service.leave(&session_id);
        }
    }
}

fn target(doc: Option<DocumentId>) -> ProtocolResult<DocumentId> {
    doc.ok_or_else(|| ProtocolError::MissingArgument("document_id".into()))
}

/// Move queued events into `out`; returns true once the feed is closed
fn drain_feed(feed: &mut SessionFeed, out: &mut Vec<serde_json::Value>) -> bool {
    loop {
        match feed.try_recv() {
            Ok(event) => out.push(serde_json::json!({
                "session": feed.session_id(),
                "event": event,
            })),
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::EngineConfig;

    fn handler_pair() -> (CommandHandler, CommandHandler) {
        let service = Arc::new(CollaborationService::new(EngineConfig::default()));
        let mut alice = CommandHandler::new("c1", service.clone());
        let mut bob = CommandHandler::new("c2", service);
        alice.execute_line("AS u1 Alice");
        bob.execute_line("AS u2 Bob");
        (alice, bob)
    }

    fn json(response: Response) -> serde_json::Value {
        match response {
            Response::Json(v) => v,
            other => panic!("expected json, got {:?}", other),
        }
    }

    fn create(handler: &mut CommandHandler, title: &str) -> String {
        let summary = json(handler.execute_line(&format!("CREATE {} CONTENT v1", title)));
        summary["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_requires_identity() {
        let service = Arc::new(CollaborationService::default());
        let mut handler = CommandHandler::new("c1", service);

        assert_eq!(handler.execute_line("PING"), Response::Pong);
        let resp = handler.execute_line("LIST");
        assert_eq!(resp.status(), 401);
    }

    #[test]
    fn test_create_update_history() {
        let (mut alice, _) = handler_pair();
        let id = create(&mut alice, "Plan");

        let summary = json(alice.execute_line(&format!("UPDATE {} v2", id)));
        assert_eq!(summary["version"], 2);

        let history = json(alice.execute_line(&format!("HISTORY {}", id)));
        assert_eq!(history[0]["content"], "v1");
        assert_eq!(history[0]["version"], 1);
    }

    #[test]
    fn test_stranger_gets_403() {
        let (mut alice, mut bob) = handler_pair();
        let id = create(&mut alice, "Secret");

        let resp = bob.execute_line(&format!("GET {}", id));
        assert_eq!(resp.status(), 403);
        assert!(matches!(resp, Response::Error { ref code, .. } if code == "ACCESS_DENIED"));

        let resp = bob.execute_line(&format!("RESTORE {} 99", id));
        assert_eq!(resp.status(), 403);
    }

    #[test]
    fn test_share_and_collaborate() {
        let (mut alice, mut bob) = handler_pair();
        let id = create(&mut alice, "Plan");

        json(alice.execute_line(&format!("SHARE {} u2 write", id)));
        let summary = json(bob.execute_line(&format!("UPDATE {} \"from bob\"", id)));
        assert_eq!(summary["lastEditedBy"], "u2");

        let suggestion = json(bob.execute_line(&format!("SUGGEST {} insert AT 0 0 Hi", id)));
        let sid = suggestion["id"].as_str().unwrap().to_string();

        let resp = bob.execute_line(&format!("ACCEPT {} {}", id, sid));
        assert_eq!(resp.status(), 403);

        let accepted = json(alice.execute_line(&format!("ACCEPT {} {}", id, sid)));
        assert_eq!(accepted["status"], "accepted");

        let resp = alice.execute_line(&format!("REJECT {} {}", id, sid));
        assert_eq!(resp.status(), 409);
    }

    #[test]
    fn test_join_events_and_kick() {
        let (mut alice, mut bob) = handler_pair();
        let id = create(&mut alice, "Live");
        alice.execute_line(&format!("SHARE {} u2 read", id));

        let joined = json(bob.execute_line(&format!("JOIN {}", id)));
        assert_eq!(joined["session"]["canEdit"], false);
        let bob_session = joined["session"]["id"].as_str().unwrap().to_string();

        alice.execute_line(&format!("COMMENT {} AT 0 2 check this", id));

        let events = json(bob.execute_line("EVENTS"));
        let types: Vec<&str> = events
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event"]["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["user-joined", "comment-added"]);

        // only the owner may kick
        assert_eq!(bob.execute_line(&format!("KICK {} u1", id)).status(), 403);
        assert!(matches!(
            alice.execute_line(&format!("KICK {} u2", id)),
            Response::Ok(Some(ref m)) if m == "1 session(s) closed"
        ));

        bob.execute_line("EVENTS");
        assert!(bob.open_sessions().is_empty());
        assert_eq!(bob.execute_line(&format!("LEAVE {}", bob_session)).status(), 404);
    }

    #[test]
    fn test_cursor_on_foreign_session_is_not_found() {
        let (mut alice, mut bob) = handler_pair();
        let id = create(&mut alice, "Cursor");
        let joined = json(alice.execute_line(&format!("JOIN {}", id)));
        let session = joined["session"]["id"].as_str().unwrap().to_string();

        assert_eq!(alice.execute_line(&format!("CURSOR {} {{\"pos\":1}}", session)), Response::ok());
        assert_eq!(bob.execute_line(&format!("CURSOR {} 1", session)).status(), 404);
    }

    #[test]
    fn test_quit_leaves_sessions() {
        let (mut alice, _) = handler_pair();
        let id = create(&mut alice, "Bye");
        alice.execute_line(&format!("JOIN {}", id));
        assert_eq!(alice.open_sessions().len(), 1);

        alice.execute_line("QUIT");
        assert!(alice.open_sessions().is_empty());
        assert_eq!(alice.service.stats().session_count, 0);
    }

    #[test]
    fn test_process_multiple_lines() {
        let service = Arc::new(CollaborationService::default());
        let mut handler = CommandHandler::new("c1", service);

        let responses = handler.process(b"AS u1\r\nPING\r\nBOGUS\r\nLIST\r\n");
        assert_eq!(responses.len(), 4);
        assert!(matches!(responses[0], Response::Ok(_)));
        assert_eq!(responses[1], Response::Pong);
        assert_eq!(responses[2].status(), 400);
        assert_eq!(responses[3], Response::Json(serde_json::json!([])));
    }
}
