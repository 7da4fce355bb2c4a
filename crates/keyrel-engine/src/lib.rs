//! Scan and modify engines for keyrel.
//!
//! This crate maps relational rows onto key-value collections. A table is
//! described by a [`TableConfig`](keyrel_types::TableConfig) and a
//! [`TableSchema`](keyrel_types::TableSchema); the engines turn reads into
//! cursor enumerations or direct lookups, and writes into the commands for
//! the table's collection kind.
//!
//! # Modules
//!
//! - [`scan`] -- Row production: singleton reads, key lookups, cursor pages
//! - [`modify`] -- Insert, update, and delete of rows
//! - [`codec`] -- Values to store text and replies to column text
//! - [`qualifier`] -- Recognition of pushdown-eligible restrictions
//! - [`config`] -- YAML table definitions
//! - [`error`] -- Engine error type
//!
//! # Example
//!
//! ```no_run
//! use keyrel_engine::{Expr, KeyrelConfig, Scan};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let definitions = KeyrelConfig::parse("tables: { users: { columns: [{ name: key }, { name: value }] } }")?;
//! let (config, schema) = definitions.resolve("users")?;
//! let scan = Scan::connect(&config, &schema, &[Expr::text_eq(0, "user:1")]).await?;
//! for row in scan.into_rows().await? {
//!     println!("{:?}", row.columns);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod modify;
pub mod qualifier;
pub mod scan;

// Re-export primary types for convenience.
pub use config::{ConfigError, KeyrelConfig, ServerConfig, TableDefinition};
pub use error::EngineError;
pub use modify::{Modify, Operation};
pub use qualifier::{Expr, Operator, Qualifier};
pub use scan::{Scan, ScanMode};
