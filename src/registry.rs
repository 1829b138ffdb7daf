//! Type and table registries
//!
//! `TypeRegistry` maps stable type keys to record-type handles, so a type
//! stored by name can be found again after a reload. `TableRegistry` maps
//! table names to the record type and primary key stored there, and mirrors
//! itself into the `__record_tables__` table.
//!
//! Both are owned by a single `Database`; nothing here is process-wide.

use std::collections::HashMap;
use crate::record::{Record, RecordType};
use crate::storage::{Column, METADATA_TABLE, Row, SqliteStore, QueryOptions};
use crate::value::{FromValue, Value};
use crate::{Error, Result};

/// Record types known to a database, by `Record::TYPE_NAME`
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<&'static str, RecordType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` and every record type reachable from its fields
    pub fn register<T: Record>(&mut self) {
        self.register_type(T::record_type());
    }

    pub fn register_type(&mut self, ty: RecordType) {
        let mut pending = vec![ty];
        while let Some(ty) = pending.pop() {
            if self.types.contains_key(ty.name()) {
                continue;
            }
            self.types.insert(ty.name(), ty);
            pending.extend(ty.nested_types());
        }
    }

    pub fn resolve(&self, type_name: &str) -> Result<RecordType> {
        self.types
            .get(type_name)
            .copied()
            .ok_or_else(|| Error::TypeResolution(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Registry row: the record type and primary key of one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub table: String,
    pub record_type: RecordType,
    /// Primary-key field names; only the first one keys rows
    pub primary_keys: Vec<String>,
}

impl TableEntry {
    pub fn new(table: impl Into<String>, record_type: RecordType, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            record_type,
            primary_keys: vec![primary_key.into()],
        }
    }

    pub fn primary_key(&self) -> &str {
        self.primary_keys.first().map(String::as_str).unwrap_or_default()
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("table_name".into(), Value::from(&self.table));
        row.insert("type_name".into(), Value::from(self.record_type.name()));
        row.insert("primary_keys".into(), Value::from(self.primary_keys.clone()));
        row
    }
}

fn metadata_columns() -> Vec<Column> {
    ["table_name", "type_name", "primary_keys"]
        .into_iter()
        .map(|name| Column {
            name: name.to_string(),
            affinity: Some("TEXT"),
        })
        .collect()
}

/// Tables known to a database
#[derive(Debug, Default, Clone)]
pub struct TableRegistry {
    entries: HashMap<String, TableEntry>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a table to a record type and persist the binding.
    ///
    /// Re-registering the same type is a no-op; a different type fails.
    pub fn register(
        &mut self,
        store: &SqliteStore,
        table: &str,
        record_type: RecordType,
        primary_key: &str,
    ) -> Result<&TableEntry> {
        if let Some(existing) = self.entries.get(table) {
            if existing.record_type != record_type {
                return Err(Error::SchemaConflict(format!(
                    "table '{}' is bound to '{}', can not bind it to '{}'",
                    table, existing.record_type, record_type
                )));
            }
        } else {
            let entry = TableEntry::new(table, record_type, primary_key);
            store.upsert(METADATA_TABLE, &entry.to_row(), &metadata_columns(), "table_name", &[])?;
            tracing::debug!("Registered table '{}' for {} (pk: {})", table, record_type, primary_key);
            self.entries.insert(table.to_string(), entry);
        }
        self.entry(table)
    }

    pub fn get(&self, table: &str) -> Option<&TableEntry> {
        self.entries.get(table)
    }

    /// The entry of a registered table
    pub fn entry(&self, table: &str) -> Result<&TableEntry> {
        self.entries
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.entries.contains_key(table)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild every entry from the registry table, resolving type names
    pub fn reload(&mut self, store: &SqliteStore, types: &TypeRegistry) -> Result<()> {
        let stored = stored_tables(store)?;
        let mut entries = HashMap::with_capacity(stored.len());
        for StoredTable { table, type_name, primary_keys } in stored {
            if primary_keys.is_empty() {
                return Err(Error::Consistency(format!("table '{}' has no primary key recorded", table)));
            }
            let record_type = types.resolve(&type_name)?;
            entries.insert(
                table.clone(),
                TableEntry {
                    table,
                    record_type,
                    primary_keys,
                },
            );
        }
        tracing::debug!("Reloaded {} table entries", entries.len());
        self.entries = entries;
        Ok(())
    }
}

/// A registry row as stored, before its type name is resolved
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTable {
    pub table: String,
    pub type_name: String,
    pub primary_keys: Vec<String>,
}

/// Read the registry table without resolving any types
pub fn stored_tables(store: &SqliteStore) -> Result<Vec<StoredTable>> {
    if !store.table_exists(METADATA_TABLE)? {
        return Ok(Vec::new());
    }
    let rows = store.query(METADATA_TABLE, &QueryOptions::new().order_by("table_name"))?;
    let mut stored = Vec::with_capacity(rows.len());
    for mut row in rows {
        let table = String::from_value(row.shift_remove("table_name").unwrap_or_default())?;
        let type_name = String::from_value(row.shift_remove("type_name").unwrap_or_default())?;
        let primary_keys = match row.shift_remove("primary_keys").unwrap_or_default() {
            Value::Text(json) => Vec::<String>::from_value(Value::parse_json(&json)?)?,
            other => Vec::<String>::from_value(other)?,
        };
        stored.push(StoredTable {
            table,
            type_name,
            primary_keys,
        });
    }
    Ok(stored)
}
