//! Recordstore CLI - inspect saved record databases

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use recordstore::config::{default_config_path, default_database_path, load_config, write_config};
use recordstore::storage::QueryOptions;
use recordstore::ui::{summary_table, TableSummary};
use recordstore::{stored_tables, SqliteStore, StoreConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "recordstore")]
#[command(version = "0.0.1")]
#[command(about = "Typed record store over SQLite - inspect saved databases")]
#[command(long_about = r#"
Recordstore keeps schema-typed records in SQLite tables, one table per
record type, with nested records linked through foreign keys.

The CLI reads a saved database without the record types compiled in:
  recordstore tables
  recordstore count Persons --database people.db
  recordstore rows Persons --limit 10 --order-by name
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the database file (falls back to the config, then recordstore.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// List registered tables with their record types and row counts
    Tables,

    /// Count the rows of a table
    Count {
        /// Table name
        table: String,
    },

    /// Print the raw rows of a table as JSON lines
    Rows {
        /// Table name
        table: String,

        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<usize>,

        /// Column to order by
        #[arg(short, long)]
        order_by: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    if let Commands::Init { force } = cli.command {
        write_config(&config_path, &StoreConfig::default(), force)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let config = load_config(Some(config_path.as_path()))?.unwrap_or_default();
    let database = cli
        .database
        .or(config.database)
        .unwrap_or_else(default_database_path);
    let store = open_existing(&database)?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Tables => {
            let mut summaries = Vec::new();
            for stored in stored_tables(&store)? {
                summaries.push(TableSummary {
                    rows: store.count(&stored.table)?,
                    table: stored.table,
                    record_type: stored.type_name,
                    primary_key: stored.primary_keys.join(", "),
                });
            }

            if summaries.is_empty() {
                println!("No tables in {}", database.display());
            } else {
                println!("{}", summary_table(&summaries));
            }
        }

        Commands::Count { table } => {
            ensure_registered(&store, &table)?;
            println!("{}", store.count(&table)?);
        }

        Commands::Rows { table, limit, order_by } => {
            ensure_registered(&store, &table)?;
            let mut options = QueryOptions::new();
            if let Some(limit) = limit {
                options = options.limit(limit);
            }
            if let Some(order_by) = order_by {
                options = options.order_by(format!("\"{}\"", order_by.replace('"', "\"\"")));
            }

            for row in store.query(&table, &options)? {
                let json: serde_json::Map<String, serde_json::Value> =
                    row.iter().map(|(column, value)| (column.clone(), value.to_json())).collect();
                println!("{}", serde_json::Value::Object(json));
            }
        }
    }

    Ok(())
}

fn open_existing(path: &Path) -> anyhow::Result<SqliteStore> {
    if !path.is_file() {
        anyhow::bail!("database not found: {}", path.display());
    }
    tracing::debug!("Opening {}", path.display());
    Ok(SqliteStore::open(path)?)
}

fn ensure_registered(store: &SqliteStore, table: &str) -> anyhow::Result<()> {
    if !stored_tables(store)?.iter().any(|t| t.table == table) {
        return Err(recordstore::Error::TableNotFound(table.to_string()).into());
    }
    Ok(())
}
