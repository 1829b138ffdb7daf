//! # Recordstore - typed records in SQLite
//!
//! Persists schema-typed records into a relational store, deriving each table's
//! columns from the record's field declarations.
//!
//! Recordstore provides:
//! - A reflection-free `Record` trait describing fields and their declared types
//! - Type-directed projection of field values into flat rows (scalars, JSON lists,
//!   foreign-key references, custom conversions)
//! - Recursive upsert of nested records into their own tables
//! - Reconstruction of typed records from rows, resolving foreign keys back into
//!   nested records
//! - Whole-database save/load and a snapshot-on-failure wrapper

pub mod value;
pub mod record;
pub mod projector;
pub mod registry;
pub mod mapper;
pub mod rebuilder;
pub mod database;
pub mod failsafe;
pub mod storage;
pub mod paths;
pub mod config;
pub mod ui;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use value::{FromValue, Value};
pub use record::{FieldDef, FieldType, Hooks, Record, RecordType, RecordValue, SpecialInsert, StorableForm};
pub use registry::{stored_tables, StoredTable, TableEntry, TableRegistry, TypeRegistry};
pub use database::{AddOptions, Database, QueryOptions};
pub use rebuilder::Records;
pub use failsafe::FailSafeDatabase;
pub use config::StoreConfig;
pub use storage::SqliteStore;

use std::path::PathBuf;

/// Result type alias for Recordstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Recordstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value that is not a record, or a record of the wrong type for a table
    #[error("Input type error: {0}")]
    InputType(String),

    /// Foreign-key wiring or table registration conflicts
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Column '{column}' of table '{table}' has no declared field")]
    SchemaMismatch { table: String, column: String },

    #[error("Cannot resolve record type '{0}'")]
    TypeResolution(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Raised by record construction or by custom conversion of a list
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Can't find table '{0}' in database")]
    TableNotFound(String),

    #[error("Can not load {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("{0} is not reentrant")]
    Reentrant(&'static str),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
