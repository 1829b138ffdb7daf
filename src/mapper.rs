//! Record mapper - writes records into flat rows
//!
//! Walks a record's declared fields through the projector, upserts nested
//! records into their foreign tables first, then upserts the assembled row.

use std::collections::HashMap;
use crate::projector::{self, Nested, Projection};
use crate::record::RecordValue;
use crate::registry::{TableEntry, TableRegistry, TypeRegistry};
use crate::storage::{Column, ForeignKey, Row, SqliteStore};
use crate::value::Value;
use crate::{Error, Result};

/// Store-side half of the mapping engine
pub struct RecordMapper<'a> {
    store: &'a SqliteStore,
    tables: &'a mut TableRegistry,
    types: &'a mut TypeRegistry,
}

impl<'a> RecordMapper<'a> {
    pub fn new(store: &'a SqliteStore, tables: &'a mut TableRegistry, types: &'a mut TypeRegistry) -> Self {
        Self { store, tables, types }
    }

    /// Store any value; only records are accepted
    pub fn store(
        &mut self,
        table: &str,
        value: &Value,
        foreign_tables: &HashMap<String, String>,
        overwrite_nested: bool,
        primary_key: &str,
    ) -> Result<()> {
        match value {
            Value::Record(record) => self.store_record(table, record, foreign_tables, overwrite_nested, primary_key),
            other => Err(Error::InputType(format!(
                "Only records can be added to the database, got {}",
                other.kind()
            ))),
        }
    }

    /// Upsert a record into `table`, registering the table on first use.
    ///
    /// `primary_key` only applies when the table is new; afterwards the
    /// registered key is used.
    pub fn store_record(
        &mut self,
        table: &str,
        record: &RecordValue,
        foreign_tables: &HashMap<String, String>,
        overwrite_nested: bool,
        primary_key: &str,
    ) -> Result<()> {
        let ty = record.record_type();
        let fields = ty.fields();
        self.types.register_type(ty);

        if !self.tables.contains(table) {
            if !fields.iter().any(|f| f.name == primary_key) {
                return Err(Error::InputType(format!(
                    "record type '{}' has no field '{}' to use as primary key",
                    ty, primary_key
                )));
            }
            self.tables.register(self.store, table, ty, primary_key)?;
        }

        let entry = self.tables.entry(table)?.clone();
        if entry.record_type != ty {
            return Err(Error::InputType(format!(
                "Only records of type '{}' can be added to the table '{}', got '{}'",
                entry.record_type, table, ty
            )));
        }

        let base = match ty.hooks().storable() {
            Some(storable) => storable(record)?,
            None => record.clone(),
        };
        if let Some((column, _)) = base.iter().find(|(name, _)| !fields.iter().any(|f| f.name == *name)) {
            return Err(Error::SchemaMismatch {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        let mut row = Row::with_capacity(fields.len());
        for field in &fields {
            let value = match base.get(field.name) {
                Some(value) => value.clone(),
                None => field.default.clone().ok_or_else(|| {
                    Error::InputType(format!("record of type '{}' is missing field '{}'", ty, field.name))
                })?,
            };
            row.insert(field.name.to_string(), value);
        }

        let mut foreign_keys = Vec::new();
        for field in &fields {
            let value = record.get(field.name).cloned().unwrap_or_default();
            match projector::project(&field.ty, &value)? {
                Projection::Keep => {}
                Projection::Store(stored) => {
                    row.insert(field.name.to_string(), stored);
                }
                Projection::Reference(nested) => {
                    let target = self.foreign_table(field.name, foreign_tables)?;
                    foreign_keys.push(ForeignKey {
                        column: field.name.to_string(),
                        other_table: target.table.clone(),
                        other_column: target.primary_key().to_string(),
                    });
                    let stored = match nested {
                        Nested::One(nested) => self.upsert_nested(&nested, &target, overwrite_nested)?,
                        Nested::Many(nested) => Value::List(
                            nested
                                .iter()
                                .map(|r| self.upsert_nested(r, &target, overwrite_nested))
                                .collect::<Result<Vec<_>>>()?,
                        ),
                    };
                    row.insert(field.name.to_string(), stored);
                }
            }
        }

        let columns: Vec<Column> = fields.iter().map(Column::for_field).collect();
        self.store
            .upsert(table, &row, &columns, entry.primary_key(), &foreign_keys)?;
        tracing::debug!("Upserted {} into '{}'", ty, table);
        Ok(())
    }

    /// Target table of a reference field
    fn foreign_table(&self, field: &str, foreign_tables: &HashMap<String, String>) -> Result<TableEntry> {
        let Some(target) = foreign_tables.get(field) else {
            let mut keys: Vec<&str> = foreign_tables.keys().map(String::as_str).collect();
            keys.sort_unstable();
            return Err(Error::SchemaConflict(format!(
                "detect field '{}' of record type, but can not find it in foreign tables (keys: {:?})",
                field, keys
            )));
        };
        self.tables.get(target).cloned().ok_or_else(|| {
            Error::SchemaConflict(format!(
                "can not add a record with a foreign key '{}' to a table '{}' which does not exist",
                field, target
            ))
        })
    }

    /// Upsert a nested record unless it is present and must be kept; returns its key
    fn upsert_nested(&mut self, record: &RecordValue, target: &TableEntry, overwrite_nested: bool) -> Result<Value> {
        let key = record.key(target.primary_key())?;
        let present = self.store.table_exists(&target.table)?
            && !self
                .store
                .rows_where_eq(&target.table, target.primary_key(), &key)?
                .is_empty();

        if !present || overwrite_nested {
            let nested_foreign_tables = self.store.foreign_key_map(&target.table)?;
            self.store_record(
                &target.table,
                record,
                &nested_foreign_tables,
                overwrite_nested,
                target.primary_key(),
            )?;
        }
        Ok(key)
    }
}
