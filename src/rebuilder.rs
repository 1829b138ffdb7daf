//! Record rebuilder - reads rows back into records
//!
//! Decodes each column through the projector's read rules and follows
//! foreign-key columns into their tables, recursively.

use std::marker::PhantomData;
use crate::projector;
use crate::record::{Record, RecordValue};
use crate::registry::{TableEntry, TableRegistry};
use crate::storage::{QueryOptions, Row, SqliteStore};
use crate::value::Value;
use crate::{Error, Result};

/// Load-side half of the mapping engine
pub struct RecordRebuilder<'a> {
    store: &'a SqliteStore,
    tables: &'a TableRegistry,
    /// `(table, key)` of the rows currently being decoded
    visiting: Vec<(String, String)>,
}

impl<'a> RecordRebuilder<'a> {
    pub fn new(store: &'a SqliteStore, tables: &'a TableRegistry) -> Self {
        Self {
            store,
            tables,
            visiting: Vec::new(),
        }
    }

    /// Load one record by primary key; `None` if absent
    pub fn load(&mut self, table: &str, key: &Value) -> Result<Option<RecordValue>> {
        let tables = self.tables;
        let entry = tables.entry(table)?;
        if !self.store.table_exists(table)? {
            return Ok(None);
        }

        let mut rows = self.store.rows_where_eq(table, entry.primary_key(), key)?;
        match rows.len() {
            0 => Ok(None),
            1 => {
                let row = rows.remove(0);
                self.decode_row(entry, row).map(Some)
            }
            n => Err(Error::Consistency(format!(
                "{} rows in table '{}' share the primary key {}",
                n, table, key
            ))),
        }
    }

    /// Rows of a table matching the query options, still undecoded
    pub fn rows(&self, table: &str, options: &QueryOptions) -> Result<(&'a TableEntry, Vec<Row>)> {
        let tables = self.tables;
        let entry = tables.entry(table)?;
        if !self.store.table_exists(table)? {
            return Ok((entry, Vec::new()));
        }
        Ok((entry, self.store.query(table, options)?))
    }

    /// Decode one row of `entry`'s table
    pub fn decode_row(&mut self, entry: &TableEntry, row: Row) -> Result<RecordValue> {
        let marker = (
            entry.table.clone(),
            row.get(entry.primary_key())
                .map(Value::to_display_string)
                .unwrap_or_default(),
        );
        if self.visiting.contains(&marker) {
            return Err(Error::Consistency(format!(
                "reference cycle through table '{}' at key {}",
                marker.0, marker.1
            )));
        }

        self.visiting.push(marker);
        let decoded = self.decode_fields(entry, row);
        self.visiting.pop();
        decoded
    }

    fn decode_fields(&mut self, entry: &TableEntry, row: Row) -> Result<RecordValue> {
        let fields = entry.record_type.fields();
        let foreign = self.store.foreign_key_map(&entry.table)?;
        let mut record = RecordValue::new(entry.record_type);

        for (column, stored) in row {
            let field = fields.iter().find(|f| f.name == column).ok_or_else(|| Error::SchemaMismatch {
                table: entry.table.clone(),
                column: column.clone(),
            })?;
            let foreign_table = foreign.get(&column).map(String::as_str);
            let value = projector::unproject(&field.ty, stored, foreign_table, |table, key| {
                Ok(self.load(table, &key)?.map(Value::Record).unwrap_or(Value::Null))
            })?;
            record.set(column, value);
        }

        for field in &fields {
            if !record.contains(field.name) {
                if let Some(default) = &field.default {
                    record.set(field.name, default.clone());
                }
            }
        }
        Ok(record)
    }
}

/// Lazy sequence of typed records from one query.
///
/// Rows are fetched up front; each is decoded (nested references included)
/// only when the iterator reaches it.
pub struct Records<'a, T> {
    rebuilder: RecordRebuilder<'a>,
    entry: &'a TableEntry,
    rows: std::vec::IntoIter<Row>,
    _marker: PhantomData<T>,
}

impl<'a, T: Record> Records<'a, T> {
    pub fn new(store: &'a SqliteStore, tables: &'a TableRegistry, table: &str, options: &QueryOptions) -> Result<Self> {
        let rebuilder = RecordRebuilder::new(store, tables);
        let (entry, rows) = rebuilder.rows(table, options)?;
        Ok(Self {
            rebuilder,
            entry,
            rows: rows.into_iter(),
            _marker: PhantomData,
        })
    }
}

impl<T: Record> Iterator for Records<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(self.rebuilder.decode_row(self.entry, row).and_then(T::from_record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
