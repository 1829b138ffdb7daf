//! Database facade
//!
//! Owns one storage connection together with the type and table registries,
//! and exposes the add/get/iterate/save/load surface over them.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tempfile::{NamedTempFile, TempDir};

use crate::config::StoreConfig;
use crate::mapper::RecordMapper;
use crate::paths;
use crate::rebuilder::{RecordRebuilder, Records};
use crate::record::{Record, RecordValue};
use crate::registry::{TableEntry, TableRegistry, TypeRegistry};
use crate::storage::SqliteStore;
use crate::value::Value;
use crate::{Error, Result};

pub use crate::storage::QueryOptions;

/// Options for [`Database::add_with`]
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Field name → table holding the referenced records
    pub foreign_tables: HashMap<String, String>,
    /// Primary-key field for a new table; the configured default when unset
    pub primary_key: Option<String>,
    /// Re-store nested records that are already present
    pub overwrite_nested: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            foreign_tables: HashMap::new(),
            primary_key: None,
            overwrite_nested: true,
        }
    }
}

impl AddOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn foreign_table(mut self, field: impl Into<String>, table: impl Into<String>) -> Self {
        self.foreign_tables.insert(field.into(), table.into());
        self
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn overwrite_nested(mut self, overwrite_nested: bool) -> Self {
        self.overwrite_nested = overwrite_nested;
        self
    }
}

/// A typed record store over one SQLite connection
pub struct Database {
    store: SqliteStore,
    types: TypeRegistry,
    tables: TableRegistry,
    config: StoreConfig,
}

impl Database {
    /// Create an empty in-memory database
    pub fn new() -> Result<Self> {
        Ok(Self::from_store(SqliteStore::open_in_memory()?))
    }

    /// Open a file-backed database.
    ///
    /// Existing tables become visible once their record types are known,
    /// see [`Database::with_types`] and [`Database::refresh_tables`].
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_store(SqliteStore::open(path)?))
    }

    /// Open the configured database file, or an in-memory one
    pub fn from_config(config: StoreConfig) -> Result<Self> {
        let db = match &config.database {
            Some(path) => Self::open(path)?,
            None => Self::new()?,
        };
        Ok(db.with_config(config))
    }

    fn from_store(store: SqliteStore) -> Self {
        Self {
            store,
            types: TypeRegistry::new(),
            tables: TableRegistry::new(),
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a type registry and rebind the tables already stored
    pub fn with_types(mut self, types: TypeRegistry) -> Result<Self> {
        self.types = types;
        self.refresh_tables()?;
        Ok(self)
    }

    /// Make `T` (and the types nested in it) resolvable by name
    pub fn register<T: Record>(&mut self) -> &mut Self {
        self.types.register::<T>();
        self
    }

    /// Rebuild the table registry from the stored metadata
    pub fn refresh_tables(&mut self) -> Result<()> {
        self.tables.reload(&self.store, &self.types)
    }

    /// Backing file, `":memory:"` for an in-memory database
    pub fn filename(&self) -> Result<String> {
        self.store.filename()
    }

    // ========== Writes ==========

    pub fn add<T: Record>(&mut self, table: &str, record: &T) -> Result<()> {
        self.add_with(table, record, &AddOptions::default())
    }

    pub fn add_with<T: Record>(&mut self, table: &str, record: &T, options: &AddOptions) -> Result<()> {
        self.add_value(table, &Value::Record(record.to_record()), options)
    }

    /// Store a dynamic value; anything but a record is rejected
    pub fn add_value(&mut self, table: &str, value: &Value, options: &AddOptions) -> Result<()> {
        let primary_key = options
            .primary_key
            .as_deref()
            .unwrap_or(&self.config.primary_key);
        RecordMapper::new(&self.store, &mut self.tables, &mut self.types).store(
            table,
            value,
            &options.foreign_tables,
            options.overwrite_nested,
            primary_key,
        )
    }

    // ========== Reads ==========

    /// Whether a row with this primary key exists
    pub fn exists(&self, table: &str, key: impl Into<Value>) -> Result<bool> {
        let entry = self.tables.entry(table)?;
        if !self.store.table_exists(table)? {
            return Ok(false);
        }
        let rows = self.store.rows_where_eq(table, entry.primary_key(), &key.into())?;
        Ok(!rows.is_empty())
    }

    /// Whether `record`'s primary key is present in the table
    pub fn contains<T: Record>(&self, table: &str, record: &T) -> Result<bool> {
        let entry = self.tables.entry(table)?;
        let key = record.to_record().key(entry.primary_key())?;
        self.exists(table, key)
    }

    /// Load one record by primary key
    pub fn get<T: Record>(&self, table: &str, key: impl Into<Value>) -> Result<Option<T>> {
        self.check_type::<T>(table)?;
        self.get_value(table, key)?.map(T::from_record).transpose()
    }

    /// Load one record by primary key without building a concrete type
    pub fn get_value(&self, table: &str, key: impl Into<Value>) -> Result<Option<RecordValue>> {
        RecordRebuilder::new(&self.store, &self.tables).load(table, &key.into())
    }

    pub fn count(&self, table: &str) -> Result<usize> {
        self.tables.entry(table)?;
        self.store.count(table)
    }

    /// Lazily decode the rows matching `options`; call again to re-query
    pub fn iter<T: Record>(&self, table: &str, options: &QueryOptions) -> Result<Records<'_, T>> {
        self.check_type::<T>(table)?;
        Records::new(&self.store, &self.tables, table, options)
    }

    pub fn all<T: Record>(&self, table: &str) -> Result<Vec<T>> {
        self.iter(table, &QueryOptions::new())?.collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableEntry> {
        self.tables.entries()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.entries().map(|e| e.table.clone()).collect();
        names.sort();
        names
    }

    fn check_type<T: Record>(&self, table: &str) -> Result<()> {
        let entry = self.tables.entry(table)?;
        if entry.record_type != T::record_type() {
            return Err(Error::InputType(format!(
                "table '{}' holds '{}' records, not '{}'",
                table,
                entry.record_type,
                T::TYPE_NAME
            )));
        }
        Ok(())
    }

    // ========== Files ==========

    /// Save with the configured backup settings
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.save_to_file_with(path, self.config.backup, &self.config.backup_suffix)
    }

    /// Write the whole in-memory database to `path` (`.db` appended if missing).
    ///
    /// The file is written next to the destination and renamed into place.
    /// An existing destination is copied aside first when `backup` is set; if
    /// the save fails that copy is kept and its location logged.
    pub fn save_to_file_with(&self, path: &Path, backup: bool, backup_suffix: &str) -> Result<()> {
        if !self.store.is_in_memory()? {
            tracing::warn!(
                "database is persistent, already stored in a file: {}",
                self.store.filename()?
            );
            return Ok(());
        }

        let path = paths::with_db_extension(path);
        let suffix = backup.then_some(backup_suffix);
        replace_file(&path, tempfile::tempdir()?, suffix, |tmp| self.store.backup_to(tmp))?;
        tracing::debug!("Saved database to {}", path.display());
        Ok(())
    }

    /// Merge a saved file into the live database and rebind its tables.
    ///
    /// The file's table bindings are resolved before anything is written, so
    /// an unknown type or a table bound to another type leaves the live
    /// database as it was. File rows replace live rows with the same key.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let incoming = {
            let source = SqliteStore::open_read_only(path)?;
            let mut incoming = TableRegistry::new();
            incoming.reload(&source, &self.types)?;
            incoming
        };
        for entry in incoming.entries() {
            if let Some(live) = self.tables.get(&entry.table) {
                if live.record_type != entry.record_type {
                    return Err(Error::SchemaConflict(format!(
                        "table '{}' is bound to '{}', the file binds it to '{}'",
                        entry.table, live.record_type, entry.record_type
                    )));
                }
            }
        }

        let rows = self.store.import_from(path)?;
        self.refresh_tables()?;
        tracing::debug!(
            "Loaded {} rows into {} tables from {}",
            rows,
            incoming.len(),
            path.display()
        );
        Ok(())
    }
}

/// Replace `path` with the file `write` produces at the temp path it is given.
///
/// With a `backup_suffix`, an existing destination is first copied into
/// `backup_dir` as `{name}{suffix}`. The copy goes away with the directory on
/// success and is kept, its location logged, on failure.
fn replace_file<F>(path: &Path, backup_dir: TempDir, backup_suffix: Option<&str>, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let backup_file = match backup_suffix {
        Some(suffix) if path.is_file() => {
            let target = paths::unique_filename(&backup_dir.path().join(format!("{}{}", name, suffix)));
            fs::copy(path, &target)?;
            Some(target)
        }
        _ => None,
    };

    let written = temp_file_in(&dir).and_then(|tmp| {
        write(tmp.path())?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    });

    if let Err(err) = written {
        if let Some(backup_file) = backup_file {
            let _kept = backup_dir.keep();
            tracing::warn!("saved the backup file under '{}'", backup_file.display());
        }
        return Err(err);
    }
    Ok(())
}

/// A temp file that ends up with the permissions of a normally created file
fn temp_file_in(dir: &Path) -> Result<NamedTempFile> {
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // 0666 before the umask, instead of tempfile's owner-only 0600
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    Ok(builder.tempfile_in(dir)?)
}
