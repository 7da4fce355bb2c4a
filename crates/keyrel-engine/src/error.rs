//! Error types for the scan and modify engines.
//!
//! [`EngineError`] wraps store failures from `keyrel-db` and adds the
//! constraint and feature checks the engines enforce themselves. Every
//! variant maps onto an [`ErrorCode`] for the host.

use keyrel_db::DbError;
use keyrel_types::ErrorCode;

/// Errors raised by scans and modifications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A store command failed, or the session could not be set up.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The key or member being written already exists.
    #[error("key already exists: {0}")]
    UniqueViolation(String),

    /// The key does not start with the table's key prefix.
    #[error("key '{key}' does not match table key prefix '{prefix}'")]
    KeyPrefixMismatch {
        /// Offending key.
        key: String,
        /// Configured prefix.
        prefix: String,
    },

    /// An array value had no elements.
    #[error("cannot store empty list in a Redis table")]
    EmptyArray,

    /// An array written to a hash had an odd number of elements.
    #[error("cannot decompose odd number of items into a Redis hash")]
    OddHashArity(usize),

    /// A key or value was NULL.
    #[error("cannot insert NULL into a Redis table")]
    NullValue,

    /// An array element was NULL.
    #[error("cannot store NULL array element at position {0}")]
    NullElement(usize),

    /// The row or table has the wrong number of columns.
    #[error("table has incorrect number of columns: {actual} (expected {expected})")]
    ColumnCount {
        /// Columns supplied.
        actual: usize,
        /// Columns this kind of table needs.
        expected: usize,
    },

    /// A value or column has the wrong shape for this kind of table.
    #[error("{0}")]
    ValueShape(String),

    /// A composite reply contained another composite.
    #[error("nested array returns not yet supported")]
    NestedArray,

    /// Text from the store is not valid UTF-8.
    #[error("invalid byte sequence in store reply: {0}")]
    Encoding(String),

    /// A reply had a shape this kind of table cannot represent.
    #[error("{0}")]
    UnexpectedReply(String),

    /// The operation is not implemented for this kind of table.
    #[error("{0} not supported for this type of table")]
    Unsupported(&'static str),

    /// A row operation was called on a session begun for another one.
    #[error("{called} called on a modify session begun for {begun}")]
    WrongOperation {
        /// Operation attempted.
        called: &'static str,
        /// Operation the session was begun for.
        begun: &'static str,
    },

    /// A record the operation depends on is missing.
    #[error("no {what} found for key {key}")]
    NotFound {
        /// What was looked up.
        what: &'static str,
        /// Key or member looked up.
        key: String,
    },
}

impl EngineError {
    /// Classification code for the host.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Db(err) => err.code(),
            Self::UniqueViolation(_) | Self::KeyPrefixMismatch { .. } => ErrorCode::UniqueViolation,
            Self::EmptyArray
            | Self::OddHashArity(_)
            | Self::NullValue
            | Self::NullElement(_)
            | Self::ColumnCount { .. }
            | Self::ValueShape(_)
            | Self::NestedArray => ErrorCode::InvalidParameterValue,
            Self::Encoding(_) => ErrorCode::CharacterNotInRepertoire,
            Self::UnexpectedReply(_) => ErrorCode::UnableToCreateReply,
            Self::Unsupported(_) | Self::WrongOperation { .. } => ErrorCode::FeatureNotSupported,
            Self::NotFound { .. } => ErrorCode::NoDataFound,
        }
    }

    /// Whether this is a user-visible constraint violation (never retried).
    pub const fn is_constraint_violation(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::UniqueViolation | ErrorCode::InvalidParameterValue
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_error_kind() {
        assert_eq!(
            EngineError::UniqueViolation("a".to_owned()).code(),
            ErrorCode::UniqueViolation
        );
        assert_eq!(EngineError::Unsupported("delete").code(), ErrorCode::FeatureNotSupported);
        assert!(EngineError::OddHashArity(3).is_constraint_violation());
        assert!(!EngineError::Unsupported("update").is_constraint_violation());

        let store = EngineError::from(DbError::Store {
            context: "setting key k".to_owned(),
            message: "WRONGTYPE".to_owned(),
        });
        assert_eq!(store.code(), ErrorCode::UnableToCreateExecution);
        assert_eq!(store.to_string(), "setting key k: WRONGTYPE");
    }

    #[test]
    fn unsupported_message_names_the_operation() {
        assert_eq!(
            EngineError::Unsupported("delete").to_string(),
            "delete not supported for this type of table"
        );
    }
}
