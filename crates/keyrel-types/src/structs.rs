//! Core structs: the resolved table configuration, relation shape, and the
//! values and rows exchanged with the host.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::{CollectionKind, ScalarType};

/// Default store address when none is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";

/// Default store port when none is configured.
pub const DEFAULT_PORT: u16 = 6379;

/// Default per-command network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1500);

// =============================================================================
// Key organization
// =============================================================================

/// How the remote keys belonging to a table are delimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyOrganization {
    /// Every key in the selected database belongs to the table.
    #[default]
    Unscoped,
    /// A single remote key holds the whole table.
    Singleton(String),
    /// Keys starting with this prefix belong to the table.
    KeyPrefix(String),
    /// Keys listed in this remote set belong to the table.
    KeySet(String),
}

/// More than one mutually exclusive key-organization option was given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("conflicting options: {first} and {second}")]
pub struct OrganizationConflict {
    /// The first option that was set.
    pub first: &'static str,
    /// The option that conflicts with it.
    pub second: &'static str,
}

impl KeyOrganization {
    /// Build the organization from the three optional table options,
    /// rejecting any combination of more than one.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationConflict`] naming the first two options found.
    pub fn from_options(
        singleton_key: Option<String>,
        key_prefix: Option<String>,
        key_set: Option<String>,
    ) -> Result<Self, OrganizationConflict> {
        match (singleton_key, key_prefix, key_set) {
            (None, None, None) => Ok(Self::Unscoped),
            (Some(key), None, None) => Ok(Self::Singleton(key)),
            (None, Some(prefix), None) => Ok(Self::KeyPrefix(prefix)),
            (None, None, Some(set)) => Ok(Self::KeySet(set)),
            (Some(_), Some(_), _) => Err(OrganizationConflict {
                first: "singleton_key",
                second: "tablekeyprefix",
            }),
            (Some(_), None, Some(_)) => Err(OrganizationConflict {
                first: "singleton_key",
                second: "tablekeyset",
            }),
            (None, Some(_), Some(_)) => Err(OrganizationConflict {
                first: "tablekeyprefix",
                second: "tablekeyset",
            }),
        }
    }

    /// The singleton key, if this is a singleton table.
    pub fn singleton_key(&self) -> Option<&str> {
        match self {
            Self::Singleton(key) => Some(key),
            _ => None,
        }
    }

    /// The key prefix, if this is a keyprefix table.
    pub fn key_prefix(&self) -> Option<&str> {
        match self {
            Self::KeyPrefix(prefix) => Some(prefix),
            _ => None,
        }
    }

    /// The keyset name, if this is a keyset table.
    pub fn key_set(&self) -> Option<&str> {
        match self {
            Self::KeySet(set) => Some(set),
            _ => None,
        }
    }

    /// Whether the whole table lives under one remote key.
    pub const fn is_singleton(&self) -> bool {
        matches!(self, Self::Singleton(_))
    }
}

impl fmt::Display for KeyOrganization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unscoped => f.write_str("unscoped"),
            Self::Singleton(key) => write!(f, "singleton_key={key}"),
            Self::KeyPrefix(prefix) => write!(f, "tablekeyprefix={prefix}"),
            Self::KeySet(set) => write!(f, "tablekeyset={set}"),
        }
    }
}

// =============================================================================
// Table configuration
// =============================================================================

/// Fully resolved configuration for one table session.
///
/// Resolved once by the configuration layer and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Store host name or IP address.
    pub address: String,
    /// Store TCP port.
    pub port: u16,
    /// Password sent with `AUTH`, if any.
    pub credential: Option<String>,
    /// Database index passed to `SELECT`.
    pub database: u32,
    /// Remote collection kind each row maps onto.
    pub kind: CollectionKind,
    /// How the table's keys are delimited.
    pub organization: KeyOrganization,
    /// Connect and per-command timeout.
    pub timeout: Duration,
}

impl TableConfig {
    /// Configuration for a local store with default connection settings.
    pub fn new(kind: CollectionKind, organization: KeyOrganization) -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_owned(),
            port: DEFAULT_PORT,
            credential: None,
            database: 0,
            kind,
            organization,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the store address and port.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = address.into();
        self.port = port;
        self
    }

    /// Set the `AUTH` password.
    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Set the database index.
    #[must_use]
    pub const fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    /// Number of columns every row of this table has.
    ///
    /// Scoped tables are always `(key, value)`. Singleton tables have one
    /// column, plus a second for hash values and sorted-set scores.
    pub const fn row_width(&self) -> usize {
        match self.organization {
            KeyOrganization::Singleton(_) => {
                if self.kind.has_paired_column() {
                    2
                } else {
                    1
                }
            }
            KeyOrganization::Unscoped
            | KeyOrganization::KeyPrefix(_)
            | KeyOrganization::KeySet(_) => 2,
        }
    }
}

// =============================================================================
// Relation shape
// =============================================================================

/// Type of a relational column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// A single value.
    Scalar(ScalarType),
    /// A one-dimensional array of the given element type.
    Array(ScalarType),
}

impl ColumnType {
    /// Whether values of this column are arrays.
    pub const fn is_array(self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Scalar type of the column, or of its elements.
    pub const fn element_type(self) -> ScalarType {
        match self {
            Self::Scalar(ty) | Self::Array(ty) => ty,
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name. The designated key column is conventionally `key`.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
}

impl Column {
    /// A text column.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ColumnType::Scalar(ScalarType::Text),
        }
    }

    /// An array column with the given element type.
    pub fn array(name: impl Into<String>, element: ScalarType) -> Self {
        Self {
            name: name.into(),
            ty: ColumnType::Array(element),
        }
    }

    /// A scalar column of the given type.
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            ty: ColumnType::Scalar(ty),
        }
    }
}

/// Column layout of a table. The first column is always the key column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in declaration order.
    pub columns: Vec<Column>,
}

/// Name of the column a key-equality qualifier must reference.
pub const KEY_COLUMN: &str = "key";

impl TableSchema {
    /// Build a schema from its columns.
    pub const fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Conventional `(key text, value text)` layout.
    pub fn key_value() -> Self {
        Self::new(vec![Column::text(KEY_COLUMN), Column::text("value")])
    }

    /// Conventional `(key text, value <element>[])` layout.
    pub fn key_array(element: ScalarType) -> Self {
        Self::new(vec![Column::text(KEY_COLUMN), Column::array("value", element)])
    }

    /// Single `key text` column, for singleton scalar/list/set tables and
    /// key-only views of any table.
    pub fn key_only() -> Self {
        Self::new(vec![Column::text(KEY_COLUMN)])
    }

    /// Number of columns.
    pub const fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub const fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column at a zero-based position.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Type of the second (value) column, if present.
    pub fn value_type(&self) -> Option<ColumnType> {
        self.columns.get(1).map(|c| c.ty)
    }
}

// =============================================================================
// Values and rows
// =============================================================================

/// A relational value handed to the modify engine by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Text.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Double precision float.
    Float(f64),
    /// Boolean.
    Boolean(bool),
    /// One-dimensional array.
    Array(Vec<Value>),
}

impl Value {
    /// Shorthand for a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Shorthand for an array of text values.
    pub fn text_array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(values.into_iter().map(|v| Self::Text(v.into())).collect())
    }

    /// Whether this is SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A materialized row produced by a scan.
///
/// Columns are rendered text: scalars as-is, integers as decimal digits,
/// and collections as a brace-delimited array literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    /// Column values in table order.
    pub columns: Vec<String>,
}

impl Row {
    /// A one-column row.
    pub fn single(value: impl Into<String>) -> Self {
        Self {
            columns: vec![value.into()],
        }
    }

    /// A two-column row.
    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            columns: vec![key.into(), value.into()],
        }
    }

    /// Number of columns.
    pub const fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub const fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keep only the first `width` columns.
    #[must_use]
    pub fn truncated(mut self, width: usize) -> Self {
        self.columns.truncate(width);
        self
    }

    /// The first column.
    pub fn key(&self) -> Option<&str> {
        self.columns.first().map(String::as_str)
    }

    /// The second column.
    pub fn value(&self) -> Option<&str> {
        self.columns.get(1).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_options_are_mutually_exclusive() {
        let ok = KeyOrganization::from_options(None, Some("p:".to_owned()), None);
        assert_eq!(ok, Ok(KeyOrganization::KeyPrefix("p:".to_owned())));

        let conflict =
            KeyOrganization::from_options(Some("s".to_owned()), None, Some("ks".to_owned()));
        assert_eq!(
            conflict,
            Err(OrganizationConflict {
                first: "singleton_key",
                second: "tablekeyset",
            })
        );
    }

    #[test]
    fn row_width_follows_kind_and_organization() {
        let single = |kind| TableConfig::new(kind, KeyOrganization::Singleton("k".to_owned()));
        assert_eq!(single(CollectionKind::Scalar).row_width(), 1);
        assert_eq!(single(CollectionKind::List).row_width(), 1);
        assert_eq!(single(CollectionKind::Set).row_width(), 1);
        assert_eq!(single(CollectionKind::Hash).row_width(), 2);
        assert_eq!(single(CollectionKind::SortedSet).row_width(), 2);

        let scoped = TableConfig::new(CollectionKind::List, KeyOrganization::KeySet("ks".into()));
        assert_eq!(scoped.row_width(), 2);
    }

    #[test]
    fn truncated_rows_keep_leading_columns() {
        let row = Row::pair("k", "v");
        assert_eq!(row.clone().truncated(1), Row::single("k"));
        assert_eq!(row.clone().truncated(2), row);
    }

    #[test]
    fn defaults_point_at_local_store() {
        let config = TableConfig::new(CollectionKind::Scalar, KeyOrganization::Unscoped);
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database, 0);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
