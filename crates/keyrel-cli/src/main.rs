//! Command-line driver for keyrel tables.
//!
//! Loads table definitions from a YAML file and runs one scan, insert,
//! update, or delete against the live store.
//!
//! ```text
//! keyrel --config keyrel.yaml scan users --key user:1
//! keyrel insert users user:2 alice admin
//! keyrel update users user:2 --key user:3
//! keyrel delete users user:3
//! ```

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keyrel_engine::KeyrelConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::commands::OutputFormat;
use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "keyrel")]
#[command(author, version, about = "Relational tables over a key-value store", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Table definitions file
    #[arg(short, long, env = "KEYREL_CONFIG", default_value = "keyrel.yaml")]
    config: PathBuf,

    /// Print rows as JSON arrays instead of tab-separated text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the rows of a table
    Scan {
        /// Table name
        table: String,
        /// Only the row with this key (looked up directly)
        #[arg(long)]
        key: Option<String>,
        /// Show how the table would be read instead of reading it
        #[arg(long)]
        explain: bool,
    },
    /// Insert a row
    Insert {
        /// Table name
        table: String,
        /// Row key
        key: String,
        /// Value, or the elements of an array value
        values: Vec<String>,
    },
    /// Rename a row or replace its value
    Update {
        /// Table name
        table: String,
        /// Current row key
        old_key: String,
        /// New row key
        #[arg(long)]
        key: Option<String>,
        /// New value; repeat for array elements
        #[arg(long = "value")]
        values: Vec<String>,
    },
    /// Delete a row
    Delete {
        /// Table name
        table: String,
        /// Row key
        key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.code() {
                Some(code) => error!(sqlstate = code.sqlstate(), "{err}"),
                None => error!("{err}"),
            }
            ExitCode::from(err.exit_status())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let definitions = KeyrelConfig::from_file(&cli.config)?;
    info!(config = %cli.config.display(), "keyrel starting");
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Commands::Scan {
            table,
            key,
            explain,
        } => commands::scan(&definitions, &table, key, explain, format).await,
        Commands::Insert { table, key, values } => {
            commands::insert(&definitions, &table, &key, &values).await
        }
        Commands::Update {
            table,
            old_key,
            key,
            values,
        } => commands::update(&definitions, &table, &old_key, key.as_deref(), &values).await,
        Commands::Delete { table, key } => commands::delete(&definitions, &table, &key).await,
    }
}
