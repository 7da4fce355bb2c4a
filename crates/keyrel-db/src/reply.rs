//! Store replies and the validator every command result passes through.
//!
//! A raw command outcome is one of three things:
//!
//! | Outcome | Meaning | Connection |
//! |---------|---------|------------|
//! | `Err(TransportError)` | no reply arrived | must be abandoned |
//! | `Ok(Reply::Error)` | the store rejected the command | still usable |
//! | any other `Ok(Reply)` | success | still usable |
//!
//! [`check_reply`] turns the first two into a [`DbError`] carrying the
//! caller's context message.

use std::fmt;

use crate::error::{DbError, TransportError};

/// A reply received from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Absent value.
    Nil,
    /// Integer reply.
    Integer(i64),
    /// Bulk string reply (raw bytes; not guaranteed to be UTF-8).
    String(Vec<u8>),
    /// Simple status reply such as `OK`.
    Status(String),
    /// Multi-bulk reply.
    Array(Vec<Reply>),
    /// Error reported by the store.
    Error(String),
}

/// The kind of a [`Reply`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// [`Reply::Nil`]
    Nil,
    /// [`Reply::Integer`]
    Integer,
    /// [`Reply::String`]
    String,
    /// [`Reply::Status`]
    Status,
    /// [`Reply::Array`]
    Array,
    /// [`Reply::Error`]
    Error,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nil => "nil",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Status => "status",
            Self::Array => "array",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

impl Reply {
    /// Bulk string reply from text.
    pub fn string(text: impl Into<String>) -> Self {
        Self::String(text.into().into_bytes())
    }

    /// The `OK` status reply.
    pub fn ok() -> Self {
        Self::Status("OK".to_owned())
    }

    /// Kind of this reply.
    pub const fn kind(&self) -> ReplyKind {
        match self {
            Self::Nil => ReplyKind::Nil,
            Self::Integer(_) => ReplyKind::Integer,
            Self::String(_) => ReplyKind::String,
            Self::Status(_) => ReplyKind::Status,
            Self::Array(_) => ReplyKind::Array,
            Self::Error(_) => ReplyKind::Error,
        }
    }

    /// The integer payload, if this is an integer reply.
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Text payload of a string or status reply, validated as UTF-8.
    ///
    /// Returns `None` for other reply kinds.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnexpectedReply`] if a bulk string is not UTF-8.
    pub fn text(&self) -> Result<Option<&str>, DbError> {
        match self {
            Self::String(bytes) => std::str::from_utf8(bytes).map(Some).map_err(|e| {
                DbError::UnexpectedReply(format!("invalid UTF-8 in string reply: {e}"))
            }),
            Self::Status(text) => Ok(Some(text)),
            _ => Ok(None),
        }
    }
}

/// Render a context message, substituting the optional argument for the
/// first `{}` placeholder.
pub fn format_context(message: &str, arg: Option<&str>) -> String {
    match arg {
        Some(arg) if message.contains("{}") => message.replacen("{}", arg, 1),
        Some(arg) => format!("{message} {arg}"),
        None => message.to_owned(),
    }
}

/// Classify a raw command outcome.
///
/// Transport failures and store-reported errors become a [`DbError`] whose
/// text is `"<context>: <detail>"`; every other reply is returned as-is.
///
/// # Errors
///
/// Returns [`DbError::Transport`] when no reply arrived and
/// [`DbError::Store`] when the store replied with an error.
pub fn check_reply(
    outcome: Result<Reply, TransportError>,
    message: &str,
    arg: Option<&str>,
) -> Result<Reply, DbError> {
    match outcome {
        Err(TransportError { message: detail }) => Err(DbError::Transport {
            context: format_context(message, arg),
            message: detail,
        }),
        Ok(Reply::Error(detail)) => Err(DbError::Store {
            context: format_context(message, arg),
            message: detail,
        }),
        Ok(reply) => Ok(reply),
    }
}
