//! Enumeration types shared across the keyrel workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Collection kinds
// ---------------------------------------------------------------------------

/// The remote data structure a table is mapped onto.
///
/// Every dispatch point in the scan and modify engines matches on this
/// exhaustively, so adding a kind is a compile-time visible change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Plain string value (`GET` / `SET`).
    #[default]
    Scalar,
    /// Field/value map (`HGETALL` / `HSET`).
    Hash,
    /// Ordered list allowing duplicates (`LRANGE` / `RPUSH`).
    List,
    /// Unordered set of unique members (`SMEMBERS` / `SADD`).
    Set,
    /// Members ordered by a numeric score (`ZRANGE` / `ZADD`).
    #[serde(rename = "zset")]
    SortedSet,
}

impl CollectionKind {
    /// The option spelling used in table definitions.
    pub const fn option_name(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Hash => "hash",
            Self::List => "list",
            Self::Set => "set",
            Self::SortedSet => "zset",
        }
    }

    /// Whether a singleton table of this kind carries a second column
    /// (hash value or sorted-set score).
    pub const fn has_paired_column(self) -> bool {
        matches!(self, Self::Hash | Self::SortedSet)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_name())
    }
}

// ---------------------------------------------------------------------------
// Column element types
// ---------------------------------------------------------------------------

/// Scalar type of a column, or of the elements of an array column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// Text.
    #[default]
    Text,
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Float,
    /// Boolean.
    Boolean,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Classification code carried by every externally visible failure.
///
/// The host maps these onto its own error reporting; the names follow the
/// SQLSTATE classes a relational host would use for the same condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The connection could not be opened, authenticated, or pointed at
    /// the configured database.
    UnableToEstablishConnection,
    /// A command failed in transit or was rejected by the store.
    UnableToCreateExecution,
    /// A reply had a shape the table cannot represent.
    UnableToCreateReply,
    /// A key or member already exists, or violates the table's key prefix.
    UniqueViolation,
    /// The operation is not implemented for this kind of table.
    FeatureNotSupported,
    /// A value has the wrong shape (empty array, odd hash arity, null).
    InvalidParameterValue,
    /// Text returned by the store is not valid UTF-8.
    CharacterNotInRepertoire,
    /// A record the operation depends on is missing.
    NoDataFound,
    /// A table definition option is unknown or conflicting.
    InvalidOption,
}

impl ErrorCode {
    /// The five-character SQLSTATE equivalent.
    pub const fn sqlstate(self) -> &'static str {
        match self {
            Self::UnableToEstablishConnection => "HV00N",
            Self::UnableToCreateExecution => "HV00L",
            Self::UnableToCreateReply => "HV00M",
            Self::UniqueViolation => "23505",
            Self::FeatureNotSupported => "0A000",
            Self::InvalidParameterValue => "22023",
            Self::CharacterNotInRepertoire => "22021",
            Self::NoDataFound => "P0002",
            Self::InvalidOption => "HV00D",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_names_match_serde_spelling() {
        for kind in [
            CollectionKind::Scalar,
            CollectionKind::Hash,
            CollectionKind::List,
            CollectionKind::Set,
            CollectionKind::SortedSet,
        ] {
            let json = serde_json::to_string(&kind).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", kind.option_name()));
        }
    }

    #[test]
    fn zset_deserializes_from_option_spelling() {
        let kind: CollectionKind = serde_json::from_str("\"zset\"").unwrap_or_default();
        assert_eq!(kind, CollectionKind::SortedSet);
    }

    #[test]
    fn paired_columns_only_for_hash_and_zset() {
        assert!(CollectionKind::Hash.has_paired_column());
        assert!(CollectionKind::SortedSet.has_paired_column());
        assert!(!CollectionKind::List.has_paired_column());
    }
}
