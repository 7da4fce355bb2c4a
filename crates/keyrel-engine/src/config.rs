//! Table definitions loaded from YAML.
//!
//! A definitions file has a `server` section shared by every table and a
//! `tables` map keyed by table name:
//!
//! ```yaml
//! server:
//!   address: 127.0.0.1
//!   port: 6379
//!   timeout_ms: 1500
//! tables:
//!   users:
//!     tabletype: hash
//!     tablekeyprefix: "user:"
//!     columns:
//!       - { name: key, type: text }
//!       - { name: value, type: text, array: true }
//! ```
//!
//! [`KeyrelConfig::resolve`] turns one entry into the immutable
//! [`TableConfig`] and [`TableSchema`] the engines consume.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use keyrel_types::{
    CollectionKind, Column, ColumnType, DEFAULT_ADDRESS, DEFAULT_PORT, ErrorCode, KeyOrganization,
    OrganizationConflict, ScalarType, TableConfig, TableSchema,
};
use serde::Deserialize;

/// Errors that can occur when loading or resolving table definitions.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the definitions file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// No table with this name is defined.
    #[error("no table named '{0}' in configuration")]
    UnknownTable(String),

    /// More than one key-organization option was set on a table.
    #[error("table '{table}': {source}")]
    Conflict {
        /// Table name.
        table: String,
        /// The conflicting options.
        source: OrganizationConflict,
    },

    /// An option has a value the table cannot use.
    #[error("table '{table}': {message}")]
    InvalidOption {
        /// Table name, or `server` for the shared section.
        table: String,
        /// What is wrong.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl ConfigError {
    /// Classification code for the host.
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidOption
    }

    fn invalid(table: &str, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            table: table.to_owned(),
            message: message.into(),
        }
    }
}

/// Top-level definitions file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyrelConfig {
    /// Connection settings shared by every table.
    #[serde(default)]
    pub server: ServerConfig,

    /// Table definitions keyed by table name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableDefinition>,
}

/// Store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Store host name or IP address.
    #[serde(default = "default_address")]
    pub address: String,

    /// Store TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Password sent with `AUTH`.
    #[serde(default)]
    pub password: Option<String>,

    /// Default database index for tables that do not set their own.
    #[serde(default)]
    pub database: u32,

    /// Connect and per-command timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            password: None,
            database: 0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Override settings from `KEYREL_ADDRESS`, `KEYREL_PORT` and
    /// `KEYREL_PASSWORD`, reading variables through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("KEYREL_ADDRESS") {
            self.address = address;
        }
        if let Some(port) = lookup("KEYREL_PORT") {
            self.port = port.parse().map_err(|e| {
                ConfigError::invalid("server", format!("invalid KEYREL_PORT '{port}': {e}"))
            })?;
        }
        if let Some(password) = lookup("KEYREL_PASSWORD") {
            self.password = Some(password);
        }
        Ok(())
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_owned()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_timeout_ms() -> u64 {
    1500
}

/// One table as written in the definitions file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDefinition {
    /// Collection kind: `scalar`, `hash`, `list`, `set` or `zset`.
    #[serde(default)]
    pub tabletype: CollectionKind,

    /// Remote key holding the whole table.
    #[serde(default)]
    pub singleton_key: Option<String>,

    /// Prefix every key of the table starts with.
    #[serde(default)]
    pub tablekeyprefix: Option<String>,

    /// Remote set listing every key of the table.
    #[serde(default)]
    pub tablekeyset: Option<String>,

    /// Database index overriding the server default.
    #[serde(default)]
    pub database: Option<u32>,

    /// Columns in table order.
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
}

/// One column as written in the definitions file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDefinition {
    /// Column name. The first column should be called `key` for lookups
    /// to be pushed down.
    pub name: String,

    /// Scalar type, or element type when `array` is set.
    #[serde(rename = "type", default)]
    pub ty: ScalarType,

    /// Whether the column holds an array.
    #[serde(default)]
    pub array: bool,
}

impl KeyrelConfig {
    /// Load definitions from a YAML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        tracing::info!(
            path = %path.display(),
            tables = config.tables.len(),
            "Loaded table definitions"
        );
        Ok(config)
    }

    /// Parse definitions from a YAML string, then apply environment
    /// overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config
            .server
            .apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Resolve the named table into its configuration and relation shape.
    pub fn resolve(&self, table: &str) -> Result<(TableConfig, TableSchema), ConfigError> {
        let definition = self
            .tables
            .get(table)
            .ok_or_else(|| ConfigError::UnknownTable(table.to_owned()))?;

        let kind = definition.tabletype;
        let organization = KeyOrganization::from_options(
            definition.singleton_key.clone(),
            definition.tablekeyprefix.clone(),
            definition.tablekeyset.clone(),
        )
        .map_err(|source| ConfigError::Conflict {
            table: table.to_owned(),
            source,
        })?;
        let schema = resolve_columns(table, &definition.columns, &organization)?;

        let mut config = TableConfig::new(kind, organization)
            .with_address(self.server.address.clone(), self.server.port)
            .with_database(definition.database.unwrap_or(self.server.database));
        if let Some(password) = &self.server.password {
            config = config.with_credential(password.clone());
        }
        config.timeout = Duration::from_millis(self.server.timeout_ms);
        Ok((config, schema))
    }
}

fn resolve_columns(
    table: &str,
    columns: &[ColumnDefinition],
    organization: &KeyOrganization,
) -> Result<TableSchema, ConfigError> {
    match columns.len() {
        0 => return Err(ConfigError::invalid(table, "no columns defined")),
        1 | 2 => {}
        n => {
            return Err(ConfigError::invalid(
                table,
                format!("{n} columns defined, at most 2 are supported"),
            ));
        }
    }
    let resolved: Vec<Column> = columns
        .iter()
        .map(|c| Column {
            name: c.name.clone(),
            ty: if c.array {
                ColumnType::Array(c.ty)
            } else {
                ColumnType::Scalar(c.ty)
            },
        })
        .collect();
    if !organization.is_singleton() && resolved.first().is_some_and(|c| c.ty.is_array()) {
        return Err(ConfigError::invalid(
            table,
            "the key column of a scoped table cannot be an array",
        ));
    }
    Ok(TableSchema::new(resolved))
}
