//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - __record_tables__(table_name, type_name, primary_keys)
//! - one table per stored record table, one column per declared field

pub mod schema;
pub mod sqlite;

pub use schema::{Column, ForeignKey, METADATA_TABLE};
pub use sqlite::{QueryOptions, Row, SqliteStore};
