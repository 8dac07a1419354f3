//! Scribe console protocol
//!
//! A line-oriented command language for driving a
//! [`CollaborationService`](scribe_core::CollaborationService).
//!
//! ## Command Format
//! ```text
//! COMMAND [ARGS] [OPTIONS] [TEXT]
//! ```
//! Arguments may be double-quoted to include spaces. Free text (comment
//! bodies, content) runs to the end of the line.
//!
//! ## Response Format
//! ```text
//! +OK [message]            # Success
//! -ERR <code> <message>    # Error
//! $<length>\r\n<json>      # JSON payload
//! +PONG                    # Liveness
//! ```

pub mod command;
pub mod error;
pub mod handler;
pub mod parser;
pub mod response;

pub use command::{Command, CommandKind};
pub use error::{ProtocolError, ProtocolResult};
pub use handler::{CommandHandler, Identity};
pub use parser::Parser;
pub use response::Response;
