//! Error types for the store access layer.
//!
//! Every failure is classified so callers can tell whether the connection
//! is still usable: transport failures poison the session, store-reported
//! errors do not.

use keyrel_types::ErrorCode;

/// A command got no reply: the connection failed, closed, or timed out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// Description of the failure.
    pub message: String,
}

impl TransportError {
    /// Build a transport error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can occur while talking to the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// The connection could not be opened.
    #[error("failed to connect to {address}:{port}: {message}")]
    Connect {
        /// Address that was dialed.
        address: String,
        /// Port that was dialed.
        port: u16,
        /// Underlying failure.
        message: String,
    },

    /// `AUTH` failed or got no reply.
    #[error("failed to authenticate: {message}")]
    Auth {
        /// Underlying failure.
        message: String,
    },

    /// `SELECT` failed or got no reply.
    #[error("failed to select database {index}: {message}")]
    SelectDatabase {
        /// Requested database index.
        index: u32,
        /// Underlying failure.
        message: String,
    },

    /// A command got no reply. The session must not be reused.
    #[error("{context}: {message}")]
    Transport {
        /// Caller-supplied description of the command.
        context: String,
        /// Underlying failure.
        message: String,
    },

    /// The store replied with an error. The session remains usable.
    #[error("{context}: {message}")]
    Store {
        /// Caller-supplied description of the command.
        context: String,
        /// Error text reported by the store.
        message: String,
    },

    /// A reply arrived with a shape the caller cannot use.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl DbError {
    /// Classification code for the host.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Connect { .. } | Self::Auth { .. } | Self::SelectDatabase { .. } => {
                ErrorCode::UnableToEstablishConnection
            }
            Self::Transport { .. } | Self::Store { .. } => ErrorCode::UnableToCreateExecution,
            Self::UnexpectedReply(_) => ErrorCode::UnableToCreateReply,
        }
    }

    /// Whether the failure leaves the connection unusable.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Store { .. } | Self::UnexpectedReply(_))
    }
}
