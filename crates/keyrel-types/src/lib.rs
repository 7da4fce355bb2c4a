//! Shared type definitions for keyrel.
//!
//! keyrel exposes a key-value store's five collection kinds as relational
//! tables. This crate holds the data model every other crate agrees on.
//!
//! # Modules
//!
//! - [`enums`] -- Collection kinds, column element types, error codes
//! - [`structs`] -- Table configuration, relation shape, values, rows

pub mod enums;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{CollectionKind, ErrorCode, ScalarType};
pub use structs::{
    Column, ColumnType, DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_TIMEOUT, KEY_COLUMN,
    KeyOrganization, OrganizationConflict, Row, TableConfig, TableSchema, Value,
};
