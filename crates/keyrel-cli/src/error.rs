//! Error types for the `keyrel` binary.

use keyrel_engine::{ConfigError, EngineError};
use keyrel_types::ErrorCode;

/// Errors that can occur while running a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The table definitions could not be loaded or resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A scan or modification failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The arguments do not describe a valid operation.
    #[error("{0}")]
    Usage(String),

    /// A command-line value does not parse as the column's type.
    #[error("invalid value '{value}' for column {column}: {message}")]
    InvalidValue {
        /// Column the value was meant for.
        column: String,
        /// Text that was given.
        value: String,
        /// Parse failure.
        message: String,
    },

    /// Writing output failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding a row as JSON failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Classification code, for errors that came from the engine layers.
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Config(err) => Some(err.code()),
            Self::Engine(err) => Some(err.code()),
            Self::Usage(_) | Self::InvalidValue { .. } => Some(ErrorCode::InvalidParameterValue),
            Self::Io(_) | Self::Json(_) => None,
        }
    }

    /// Process exit status: 2 when the store rejected the row's data, 1 for
    /// every other failure.
    pub const fn exit_status(&self) -> u8 {
        match self {
            Self::Engine(err) if err.is_constraint_violation() => 2,
            _ => 1,
        }
    }
}
