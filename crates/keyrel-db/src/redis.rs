//! Live store connections over [`fred`].
//!
//! Each [`RedisConnection`] wraps a dedicated [`fred::prelude::Client`]
//! configured for a single attempt per command and no reconnect policy, so
//! a lost connection surfaces as a transport failure instead of being
//! papered over. Commands go out as custom commands built from the typed
//! [`Command`] set.

use std::time::Duration;

use fred::error::{Error as RedisError, ErrorKind};
use fred::prelude::*;
use fred::types::{ClusterHash, CustomCommand, Value as RedisValue};
use keyrel_types::TableConfig;

use crate::command::Command;
use crate::error::{DbError, TransportError};
use crate::reply::Reply;
use crate::session::{CommandExecutor, Session};

/// A single connection to a Redis-compatible store.
pub struct RedisConnection {
    client: Client,
    timeout: Duration,
    closed: bool,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("timeout", &self.timeout)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl RedisConnection {
    /// Open a connection to `address:port`.
    ///
    /// `timeout` bounds the connect and every later command.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connect`] if the client cannot be built or the
    /// connection is not up within `timeout`.
    pub async fn open(address: &str, port: u16, timeout: Duration) -> Result<Self, DbError> {
        let connect_error = |message: String| DbError::Connect {
            address: address.to_owned(),
            port,
            message,
        };

        let config = Config {
            server: ServerConfig::new_centralized(address, port),
            ..Config::default()
        };
        let client = Builder::from_config(config)
            .with_connection_config(|conn| {
                conn.connection_timeout = timeout;
                conn.internal_command_timeout = timeout;
                conn.max_command_attempts = 1;
            })
            .build()
            .map_err(|e| connect_error(e.to_string()))?;

        match tokio::time::timeout(timeout, client.init()).await {
            Ok(Ok(_handle)) => {}
            Ok(Err(e)) => return Err(connect_error(e.to_string())),
            Err(_) => {
                return Err(connect_error(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        }

        tracing::info!(address, port, "Connected to store");
        Ok(Self {
            client,
            timeout,
            closed: false,
        })
    }
}

impl CommandExecutor for RedisConnection {
    async fn execute(&mut self, command: &Command) -> Result<Reply, TransportError> {
        if self.closed {
            return Err(TransportError::new("connection already closed"));
        }
        let custom = CustomCommand::new_static(command.name(), ClusterHash::FirstKey, false);
        let call = self.client.custom::<RedisValue, String>(custom, command.args());
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(reply_from_value(value)),
            Ok(Err(err)) if is_transport_failure(&err) => {
                Err(TransportError::new(err.to_string()))
            }
            Ok(Err(err)) => Ok(Reply::Error(err.details().to_owned())),
            Err(_) => Err(TransportError::new(format!(
                "{} timed out after {}ms",
                command.name(),
                self.timeout.as_millis()
            ))),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.client.quit().await {
            tracing::warn!(error = %err, "Failed to close store connection cleanly");
        }
    }
}

impl Drop for RedisConnection {
    /// Sessions abandoned without `close()` still release their connection.
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            runtime.spawn(async move {
                let _ = client.quit().await;
            });
        }
    }
}

/// Open, authenticate, and select the database for `config`.
///
/// # Errors
///
/// Returns [`DbError::Connect`], [`DbError::Auth`], or
/// [`DbError::SelectDatabase`] for the step that failed. The connection is
/// released before returning an error.
pub async fn connect(config: &TableConfig) -> Result<Session<RedisConnection>, DbError> {
    let connection = RedisConnection::open(&config.address, config.port, config.timeout).await?;
    Session::establish(connection, config.credential.as_deref(), config.database).await
}

/// Errors that mean no usable reply arrived.
fn is_transport_failure(err: &RedisError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IO | ErrorKind::Timeout | ErrorKind::Canceled | ErrorKind::Protocol
    )
}

fn reply_from_value(value: RedisValue) -> Reply {
    match value {
        RedisValue::Null => Reply::Nil,
        RedisValue::Integer(n) => Reply::Integer(n),
        RedisValue::Boolean(b) => Reply::Integer(i64::from(b)),
        RedisValue::Double(d) => Reply::String(d.to_string().into_bytes()),
        RedisValue::String(s) => Reply::String(s.as_bytes().to_vec()),
        RedisValue::Bytes(b) => Reply::String(b.to_vec()),
        RedisValue::Queued => Reply::Status("QUEUED".to_owned()),
        RedisValue::Map(map) => Reply::Array(
            map.inner()
                .into_iter()
                .flat_map(|(k, v)| [Reply::String(k.as_bytes().to_vec()), reply_from_value(v)])
                .collect(),
        ),
        RedisValue::Array(values) => {
            Reply::Array(values.into_iter().map(reply_from_value).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_values_convert_to_replies() {
        let value = RedisValue::Array(vec![
            RedisValue::from("17"),
            RedisValue::Array(vec![RedisValue::from("a"), RedisValue::Null]),
        ]);
        assert_eq!(
            reply_from_value(value),
            Reply::Array(vec![
                Reply::string("17"),
                Reply::Array(vec![Reply::string("a"), Reply::Nil]),
            ])
        );
    }

    #[test]
    fn integers_stay_integers() {
        assert_eq!(reply_from_value(RedisValue::Integer(-4)), Reply::Integer(-4));
        assert_eq!(reply_from_value(RedisValue::Boolean(true)), Reply::Integer(1));
    }
}
