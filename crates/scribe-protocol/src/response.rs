//! Console response types

use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};
use serde::Serialize;

/// A console response
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// +OK [message]
    Ok(Option<String>),

    /// -ERR <code> <message>
    Error { code: String, message: String },

    /// $<length>\r\n<json>
    Json(serde_json::Value),

    /// +PONG
    Pong,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(None)
    }

    pub fn ok_with_message(msg: impl Into<String>) -> Self {
        Response::Ok(Some(msg.into()))
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Serialize `value` into a JSON response
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Response::Json(v),
            Err(e) => Response::error("INTERNAL", e.to_string()),
        }
    }

    pub fn pong() -> Self {
        Response::Pong
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    /// HTTP-like status for this response
    pub fn status(&self) -> u16 {
        match self {
            Response::Error { code, .. } => match code.as_str() {
                "NOT_FOUND" => 404,
                "ACCESS_DENIED" | "FORBIDDEN" => 403,
                "INVALID_TRANSITION" => 409,
                "NOAUTH" => 401,
                "INTERNAL" => 500,
                _ => 400,
            },
            _ => 200,
        }
    }

    /// Encode the response to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the response into an existing buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Response::Ok(None) => {
                buf.put_slice(b"+OK\r\n");
            }
            Response::Ok(Some(msg)) => {
                buf.put_slice(b"+OK ");
                buf.put_slice(msg.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Error { code, message } => {
                buf.put_slice(b"-ERR ");
                buf.put_slice(code.as_bytes());
                buf.put_slice(b" ");
                buf.put_slice(message.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Json(value) => {
                let json = value.to_string();
                buf.put_slice(b"$");
                buf.put_slice(json.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(json.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Pong => {
                buf.put_slice(b"+PONG\r\n");
            }
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(e: ProtocolError) -> Self {
        Response::error(e.code(), e.to_string())
    }
}

impl From<scribe_core::Error> for Response {
    fn from(e: scribe_core::Error) -> Self {
        Response::error(e.code(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{EntityKind, Error};

    #[test]
    fn test_encode_ok() {
        assert_eq!(Response::ok().encode().as_ref(), b"+OK\r\n");
        assert_eq!(
            Response::ok_with_message("Goodbye").encode().as_ref(),
            b"+OK Goodbye\r\n"
        );
    }

    #[test]
    fn test_encode_error() {
        let resp = Response::from(Error::AccessDenied);
        assert_eq!(resp.encode().as_ref(), b"-ERR ACCESS_DENIED Access denied\r\n");
    }

    #[test]
    fn test_encode_json() {
        let resp = Response::json(&serde_json::json!({ "a": 1 }));
        assert_eq!(resp.encode().as_ref(), b"$7\r\n{\"a\":1}\r\n");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Response::ok().status(), 200);
        assert_eq!(Response::from(Error::not_found(EntityKind::Document, "doc_1")).status(), 404);
        assert_eq!(Response::from(Error::AccessDenied).status(), 403);
        assert_eq!(Response::from(Error::forbidden("owner only")).status(), 403);
        assert_eq!(
            Response::from(Error::InvalidTransition { from: "accepted".into(), to: "rejected".into() })
                .status(),
            409
        );
        assert_eq!(Response::from(Error::InvalidInput("x".into())).status(), 400);
        assert_eq!(Response::from(ProtocolError::InvalidCommand("x".into())).status(), 400);
        assert_eq!(Response::from(ProtocolError::NoIdentity).status(), 401);
    }
}
