//! Subcommand implementations.
//!
//! Each command resolves its table from the definitions file, opens a live
//! session through the engine, and releases it before returning.

use std::io::Write;

use futures::TryStreamExt;
use keyrel_engine::{Expr, KeyrelConfig, Modify, Operation, Scan};
use keyrel_types::{Row, ScalarType, TableSchema, Value};

use crate::error::CliError;

/// How rows are written to standard output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tab-separated columns, one row per line.
    Text,
    /// One JSON array of columns per line.
    Json,
}

/// Print the rows of `table`, optionally restricted to one key.
pub async fn scan(
    definitions: &KeyrelConfig,
    table: &str,
    key: Option<String>,
    explain: bool,
    format: OutputFormat,
) -> Result<(), CliError> {
    let (config, schema) = definitions.resolve(table)?;
    let clauses: Vec<Expr> = key.map(|k| Expr::text_eq(0, k)).into_iter().collect();

    let scan = Scan::connect(&config, &schema, &clauses).await?;
    tracing::info!(table, mode = %scan.mode(), "Scanning");
    if explain {
        println!("{table}: {}", scan.mode());
        scan.close().await;
        return Ok(());
    }

    let mut rows = std::pin::pin!(scan.into_stream());
    let mut out = std::io::stdout().lock();
    let mut count: usize = 0;
    while let Some(row) = rows.try_next().await? {
        write_row(&mut out, &row, format)?;
        count = count.saturating_add(1);
    }
    tracing::info!(table, rows = count, "Scan complete");
    Ok(())
}

/// Insert one row built from a key and the value arguments.
pub async fn insert(
    definitions: &KeyrelConfig,
    table: &str,
    key: &str,
    values: &[String],
) -> Result<(), CliError> {
    let (config, schema) = definitions.resolve(table)?;
    let mut row = vec![key_value(&schema, key)?];
    if schema.len() > 1 {
        row.push(column_value(&schema, 1, values)?);
    } else if !values.is_empty() {
        return Err(CliError::Usage(format!(
            "table {table} has a single column; unexpected values {values:?}"
        )));
    }

    let mut modify = Modify::connect(config, schema, Operation::Insert).await?;
    let outcome = modify.insert(&row).await;
    modify.close().await;
    outcome?;
    tracing::info!(table, key, "Inserted");
    Ok(())
}

/// Rename a row and/or replace its value.
pub async fn update(
    definitions: &KeyrelConfig,
    table: &str,
    old_key: &str,
    new_key: Option<&str>,
    values: &[String],
) -> Result<(), CliError> {
    let (config, schema) = definitions.resolve(table)?;

    let mut targets = Vec::new();
    let mut row = vec![key_value(&schema, new_key.unwrap_or(old_key))?];
    if new_key.is_some() {
        targets.push(0);
    }
    if values.is_empty() {
        row.push(Value::Null);
    } else {
        row.push(column_value(&schema, 1, values)?);
        targets.push(1);
    }
    if targets.is_empty() {
        return Err(CliError::Usage(
            "nothing to update: pass --key and/or --value".to_owned(),
        ));
    }

    let mut modify = Modify::connect(config, schema, Operation::Update { targets }).await?;
    let outcome = modify.update(old_key, &row).await;
    modify.close().await;
    outcome?;
    tracing::info!(table, old_key, "Updated");
    Ok(())
}

/// Delete the row with the given key.
pub async fn delete(definitions: &KeyrelConfig, table: &str, key: &str) -> Result<(), CliError> {
    let (config, schema) = definitions.resolve(table)?;
    let mut modify = Modify::connect(config, schema, Operation::Delete).await?;
    let outcome = modify.delete(key).await;
    modify.close().await;
    outcome?;
    tracing::info!(table, key, "Deleted");
    Ok(())
}

fn write_row(out: &mut impl Write, row: &Row, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Text => writeln!(out, "{}", row.columns.join("\t"))?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&row.columns)?)?,
    }
    Ok(())
}

fn key_value(schema: &TableSchema, key: &str) -> Result<Value, CliError> {
    let ty = schema
        .column(0)
        .map_or(ScalarType::Text, |c| c.ty.element_type());
    parse_scalar("key", key, ty)
}

/// Build the value for column `index` from its command-line arguments.
fn column_value(schema: &TableSchema, index: usize, raw: &[String]) -> Result<Value, CliError> {
    let column = schema
        .column(index)
        .ok_or_else(|| CliError::Usage(format!("table has no column {index}")))?;
    let element = column.ty.element_type();

    if column.ty.is_array() {
        return raw
            .iter()
            .map(|text| parse_scalar(&column.name, text, element))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    match raw {
        [text] => parse_scalar(&column.name, text, element),
        [] => Err(CliError::Usage(format!("missing value for column {}", column.name))),
        _ => Err(CliError::Usage(format!(
            "column {} takes one value, got {}",
            column.name,
            raw.len()
        ))),
    }
}

fn parse_scalar(column: &str, text: &str, ty: ScalarType) -> Result<Value, CliError> {
    let invalid = |message: String| CliError::InvalidValue {
        column: column.to_owned(),
        value: text.to_owned(),
        message,
    };
    match ty {
        ScalarType::Text => Ok(Value::text(text)),
        ScalarType::Integer => text
            .parse()
            .map(Value::Integer)
            .map_err(|e: std::num::ParseIntError| invalid(e.to_string())),
        ScalarType::Float => text
            .parse()
            .map(Value::Float)
            .map_err(|e: std::num::ParseFloatError| invalid(e.to_string())),
        ScalarType::Boolean => text
            .parse()
            .map(Value::Boolean)
            .map_err(|e: std::str::ParseBoolError| invalid(e.to_string())),
    }
}
