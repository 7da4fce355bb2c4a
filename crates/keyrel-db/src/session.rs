//! Connection sessions.
//!
//! A [`Session`] owns one live connection for the duration of a single scan
//! or modify sequence. It is opened, authenticated, and pointed at the
//! configured database up front; any failure in that sequence closes the
//! partially opened connection and aborts with a typed error. There is no
//! pooling, no reuse across sessions, and no retry.
//!
//! Commands are strictly sequential: each one is awaited before the next is
//! issued.

use std::future::Future;

use crate::command::Command;
use crate::error::{DbError, TransportError};
use crate::reply::{Reply, check_reply};

/// Something that can carry commands to the store and return replies.
///
/// Store-reported errors come back as `Ok(Reply::Error)`; only a missing
/// reply is a [`TransportError`].
pub trait CommandExecutor {
    /// Send one command and wait for its reply.
    fn execute(
        &mut self,
        command: &Command,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send;

    /// Release the connection. Called at most once.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// One live, authenticated connection with its database selected.
#[derive(Debug)]
pub struct Session<E: CommandExecutor> {
    executor: E,
    broken: Option<String>,
}

impl<E: CommandExecutor> Session<E> {
    /// Authenticate (when a credential is given) and select `database`.
    ///
    /// On failure the connection is closed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Auth`] if `AUTH` gets no reply or is rejected, and
    /// [`DbError::SelectDatabase`] if `SELECT` gets no reply or is rejected.
    pub async fn establish(
        mut executor: E,
        credential: Option<&str>,
        database: u32,
    ) -> Result<Self, DbError> {
        if let Some(password) = credential {
            let auth = Command::Auth {
                password: password.to_owned(),
            };
            let failure = match executor.execute(&auth).await {
                Ok(Reply::Error(message)) | Err(TransportError { message }) => Some(message),
                Ok(_) => None,
            };
            if let Some(message) = failure {
                executor.close().await;
                return Err(DbError::Auth { message });
            }
        }

        let select = Command::Select { index: database };
        let failure = match executor.execute(&select).await {
            Ok(Reply::Error(message)) | Err(TransportError { message }) => Some(message),
            Ok(_) => None,
        };
        if let Some(message) = failure {
            executor.close().await;
            return Err(DbError::SelectDatabase {
                index: database,
                message,
            });
        }

        tracing::info!(database, "Session established");
        Ok(Self {
            executor,
            broken: None,
        })
    }

    /// Send a command, surfacing transport failures but returning
    /// store-reported errors as [`Reply::Error`].
    ///
    /// Enumeration uses this to tolerate per-key errors. A transport failure
    /// marks the session broken; later commands fail without being sent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Transport`] if no reply arrived, now or earlier.
    pub async fn send(&mut self, command: &Command) -> Result<Reply, DbError> {
        if let Some(reason) = &self.broken {
            return Err(DbError::Transport {
                context: format!("cannot send {}", command.name()),
                message: format!("connection is unusable after earlier failure: {reason}"),
            });
        }
        tracing::trace!(%command, "Sending command");
        match self.executor.execute(command).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.broken = Some(err.message.clone());
                Err(DbError::Transport {
                    context: format!("no reply to {}", command.name()),
                    message: err.message,
                })
            }
        }
    }

    /// Send a command and validate its reply.
    ///
    /// `message` describes the command for error reporting; a `{}` in it is
    /// replaced by `arg`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Transport`] if no reply arrived and
    /// [`DbError::Store`] if the store rejected the command.
    pub async fn run(
        &mut self,
        command: &Command,
        message: &str,
        arg: Option<&str>,
    ) -> Result<Reply, DbError> {
        let outcome = match self.send(command).await {
            Ok(reply) => Ok(reply),
            Err(DbError::Transport { message, .. }) => Err(TransportError { message }),
            Err(other) => return Err(other),
        };
        check_reply(outcome, message, arg)
    }

    /// Whether a transport failure has made this session unusable.
    pub const fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Release the connection.
    pub async fn close(mut self) {
        self.executor.close().await;
        tracing::info!("Session closed");
    }
}
