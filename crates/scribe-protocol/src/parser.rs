//! Console command parser

use crate::command::{Command, CommandKind};
use crate::error::{ProtocolError, ProtocolResult};
use bytes::BytesMut;
use scribe_core::{DocumentId, DocumentType, SelectionRange, SessionId};

/// Maximum message size (16MB, enough for a full document body)
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Line-oriented command parser
pub struct Parser {
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        if self.buffer.len() + data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse a complete command from the buffer
    pub fn parse(&mut self) -> ProtocolResult<Option<Command>> {
        let line_end = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let line_len = if line_end > 0 && self.buffer[line_end - 1] == b'\r' {
            line_end - 1
        } else {
            line_end
        };

        let line = String::from_utf8_lossy(&self.buffer[..line_len]).to_string();
        let _ = self.buffer.split_to(line_end + 1);

        Self::parse_line(&line).map(Some)
    }

    /// Parse a single command line
    pub fn parse_line(line: &str) -> ProtocolResult<Command> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::InvalidCommand("Empty command".into()));
        }

        let mut tokens = Tokenizer::new(line);
        let cmd = tokens
            .next()
            .ok_or_else(|| ProtocolError::InvalidCommand("Empty command".into()))?
            .to_uppercase();

        match cmd.as_str() {
            "AS" => Self::parse_as(&mut tokens),
            "CREATE" | "NEW" => Self::parse_create(&mut tokens),
            "GET" => Ok(Command::on(doc_arg(&mut tokens)?, CommandKind::Get)),
            "LIST" | "LS" => Ok(Command::global(CommandKind::List)),
            "UPDATE" | "SET" => {
                let id = doc_arg(&mut tokens)?;
                let content = tokens.text().unwrap_or_default();
                Ok(Command::on(id, CommandKind::Update { content }))
            }
            "TITLE" | "RENAME" => {
                let id = doc_arg(&mut tokens)?;
                let title = required_text(&mut tokens, "title")?;
                Ok(Command::on(id, CommandKind::Title { title }))
            }
            "SHARE" => Self::parse_share(&mut tokens),
            "UNSHARE" => {
                let id = doc_arg(&mut tokens)?;
                let user_id = required(&mut tokens, "user_id")?;
                Ok(Command::on(id, CommandKind::Unshare { user_id }))
            }
            "COMMENT" => Self::parse_comment(&mut tokens),
            "REPLY" => {
                let id = doc_arg(&mut tokens)?;
                let comment_id = required(&mut tokens, "comment_id")?;
                let text = required_text(&mut tokens, "text")?;
                Ok(Command::on(id, CommandKind::Reply { comment_id, text }))
            }
            "RESOLVE" => {
                let id = doc_arg(&mut tokens)?;
                let comment_id = required(&mut tokens, "comment_id")?;
                Ok(Command::on(id, CommandKind::Resolve { comment_id }))
            }
            "SUGGEST" => Self::parse_suggest(&mut tokens),
            "ACCEPT" => {
                let id = doc_arg(&mut tokens)?;
                let suggestion_id = required(&mut tokens, "suggestion_id")?;
                Ok(Command::on(id, CommandKind::Accept { suggestion_id }))
            }
            "REJECT" => {
                let id = doc_arg(&mut tokens)?;
                let suggestion_id = required(&mut tokens, "suggestion_id")?;
                Ok(Command::on(id, CommandKind::Reject { suggestion_id }))
            }
            "HISTORY" => Ok(Command::on(doc_arg(&mut tokens)?, CommandKind::History)),
            "RESTORE" => {
                let id = doc_arg(&mut tokens)?;
                let version = number(&mut tokens, "version")?;
                Ok(Command::on(id, CommandKind::Restore { version }))
            }
            "JOIN" => Ok(Command::on(doc_arg(&mut tokens)?, CommandKind::Join)),
            "LEAVE" => {
                let session_id = session_arg(&mut tokens)?;
                Ok(Command::global(CommandKind::Leave { session_id }))
            }
            "CURSOR" => Self::parse_cursor(&mut tokens),
            "WHO" => Ok(Command::on(doc_arg(&mut tokens)?, CommandKind::Who)),
            "KICK" => {
                let id = doc_arg(&mut tokens)?;
                let user_id = required(&mut tokens, "user_id")?;
                Ok(Command::on(id, CommandKind::Kick { user_id }))
            }
            "EXPORT" => {
                let id = doc_arg(&mut tokens)?;
                let format = match tokens.next() {
                    Some(f) => f.parse().map_err(|_| {
                        ProtocolError::InvalidArgument(format!("Invalid format: {}", f))
                    })?,
                    None => Default::default(),
                };
                Ok(Command::on(id, CommandKind::Export { format }))
            }
            "EVENTS" => {
                let session_id = tokens.next().map(SessionId::new);
                Ok(Command::global(CommandKind::Events { session_id }))
            }
            "INFO" => Ok(Command::global(CommandKind::Info)),
            "PING" => Ok(Command::global(CommandKind::Ping)),
            "QUIT" | "EXIT" => Ok(Command::global(CommandKind::Quit)),
            _ => Err(ProtocolError::InvalidCommand(format!("Unknown command: {}", cmd))),
        }
    }

    fn parse_as(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let user_id = required(tokens, "user_id")?;
        let user_name = tokens.text();
        Ok(Command::global(CommandKind::As { user_id, user_name }))
    }

    fn parse_create(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let title = required(tokens, "title")?;

        let mut doc_type = DocumentType::default();
        let mut content = String::new();

        while let Some(opt) = tokens.next() {
            match opt.to_uppercase().as_str() {
                "TYPE" => {
                    let t = tokens
                        .next()
                        .ok_or_else(|| ProtocolError::MissingArgument("type value".into()))?;
                    doc_type = t
                        .parse()
                        .map_err(|_| ProtocolError::InvalidArgument(format!("Invalid type: {}", t)))?;
                }
                "CONTENT" => {
                    content = tokens.text().unwrap_or_default();
                }
                _ => return Err(ProtocolError::InvalidArgument(format!("Unknown option: {}", opt))),
            }
        }

        Ok(Command::global(CommandKind::Create {
            title,
            doc_type,
            content,
        }))
    }

    fn parse_share(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let id = doc_arg(tokens)?;
        let user_id = required(tokens, "user_id")?;
        let permission = match tokens.next() {
            Some(p) => p
                .parse()
                .map_err(|_| ProtocolError::InvalidArgument(format!("Invalid permission: {}", p)))?,
            None => Default::default(),
        };

        Ok(Command::on(id, CommandKind::Share { user_id, permission }))
    }

    fn parse_comment(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let id = doc_arg(tokens)?;
        let selection = selection(tokens)?;
        let text = required_text(tokens, "text")?;

        Ok(Command::on(id, CommandKind::Comment { selection, text }))
    }

    fn parse_suggest(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let id = doc_arg(tokens)?;
        let k = tokens
            .next()
            .ok_or_else(|| ProtocolError::MissingArgument("suggestion type".into()))?;
        let suggestion_kind = k
            .parse()
            .map_err(|_| ProtocolError::InvalidArgument(format!("Invalid suggestion type: {}", k)))?;
        let selection = selection(tokens)?;
        let content = tokens.text().unwrap_or_default();

        Ok(Command::on(
            id,
            CommandKind::Suggest {
                suggestion_kind,
                selection,
                content,
            },
        ))
    }

    fn parse_cursor(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let session_id = session_arg(tokens)?;
        let json = tokens
            .rest()
            .ok_or_else(|| ProtocolError::MissingArgument("cursor".into()))?;
        let cursor = serde_json::from_str(&json).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        Ok(Command::global(CommandKind::Cursor { session_id, cursor }))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn required(tokens: &mut Tokenizer, name: &str) -> ProtocolResult<String> {
    tokens
        .next()
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::MissingArgument(name.into()))
}

fn required_text(tokens: &mut Tokenizer, name: &str) -> ProtocolResult<String> {
    tokens
        .text()
        .ok_or_else(|| ProtocolError::MissingArgument(name.into()))
}

fn doc_arg(tokens: &mut Tokenizer) -> ProtocolResult<DocumentId> {
    let raw = required(tokens, "document_id")?;
    DocumentId::new(raw).map_err(|e| ProtocolError::InvalidArgument(e.to_string()))
}

fn session_arg(tokens: &mut Tokenizer) -> ProtocolResult<SessionId> {
    required(tokens, "session_id").map(SessionId::new)
}

fn number(tokens: &mut Tokenizer, name: &str) -> ProtocolResult<u64> {
    let raw = tokens
        .next()
        .ok_or_else(|| ProtocolError::MissingArgument(name.into()))?;
    raw.parse()
        .map_err(|_| ProtocolError::InvalidArgument(format!("Invalid {}: {}", name, raw)))
}

/// Optional `AT <start> <end>` clause
fn selection(tokens: &mut Tokenizer) -> ProtocolResult<Option<SelectionRange>> {
    match tokens.peek() {
        Some(t) if t.eq_ignore_ascii_case("AT") => {
            tokens.next();
            let start = number(tokens, "start")?;
            let end = number(tokens, "end")?;
            SelectionRange::new(start, end)
                .map(Some)
                .map_err(|e| ProtocolError::InvalidArgument(e.to_string()))
        }
        _ => Ok(None),
    }
}

/// Simple tokenizer that handles quoted strings
#[derive(Clone, Copy)]
struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos..].starts_with(' ') {
            self.pos += 1;
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        self.skip_whitespace();

        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.pos..];

        if let Some(quoted) = remaining.strip_prefix('"') {
            if let Some(end) = quoted.find('"') {
                self.pos += end + 2;
                return Some(&quoted[..end]);
            }
        }

        let end = remaining.find(' ').unwrap_or(remaining.len());
        let token = &remaining[..end];
        self.pos += end;

        Some(token)
    }

    fn peek(&self) -> Option<&'a str> {
        let mut ahead = *self;
        ahead.next()
    }

    /// Everything left on the line, verbatim
    fn rest(&mut self) -> Option<String> {
        self.skip_whitespace();

        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = self.input[self.pos..].to_string();
        self.pos = self.input.len();
        Some(remaining)
    }

    /// Free text: the rest of the line, with one layer of quotes removed
    fn text(&mut self) -> Option<String> {
        self.rest().map(|s| {
            if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
                s[1..s.len() - 1].to_string()
            } else {
                s
            }
        })
    }
}
