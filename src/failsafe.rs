//! Snapshot-on-failure wrapper
//!
//! [`FailSafeDatabase::run`] hands a fresh in-memory [`Database`] (preloaded
//! from the bound file if it exists) to a closure. When the closure fails the
//! database is dumped to `<name>_snapshot.db`, or the next free
//! `<name>_snapshot(n).db`, before the error is passed back.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::database::Database;
use crate::paths;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::{Error, Result};

pub struct FailSafeDatabase {
    path: PathBuf,
    snapshot_suffix: String,
    types: TypeRegistry,
    config: StoreConfig,
    active: Cell<bool>,
}

/// Clears the active flag when a scope ends, however it ends
struct ActiveGuard<'a>(&'a Cell<bool>);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl FailSafeDatabase {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::from_config(path, StoreConfig::default())
    }

    pub fn from_config(path: impl AsRef<Path>, config: StoreConfig) -> Self {
        Self {
            path: paths::with_db_extension(path.as_ref()),
            snapshot_suffix: config.snapshot_suffix.clone(),
            types: TypeRegistry::new(),
            config,
            active: Cell::new(false),
        }
    }

    pub fn snapshot_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.snapshot_suffix = suffix.into();
        self
    }

    /// Make `T` resolvable when the bound file is loaded
    pub fn register<T: Record>(mut self) -> Self {
        self.types.register::<T>();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the next snapshot would be written
    pub fn next_snapshot_path(&self) -> PathBuf {
        paths::unique_filename(&paths::snapshot_path(&self.path, &self.snapshot_suffix))
    }

    /// Run `f` against the database, snapshotting it if `f` fails.
    ///
    /// Nested calls on the same wrapper fail with [`Error::Reentrant`].
    pub fn run<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Database) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        if self.active.replace(true) {
            return Err(Error::Reentrant("FailSafeDatabase").into());
        }
        let _guard = ActiveGuard(&self.active);

        let mut db = self.open().map_err(E::from)?;
        let result = f(&mut db);
        if result.is_err() {
            self.snapshot(&db);
        }
        result
    }

    fn open(&self) -> Result<Database> {
        let mut db = Database::new()?
            .with_config(self.config.clone())
            .with_types(self.types.clone())?;
        if self.path.is_file() {
            db.load_from_file(&self.path)?;
        }
        Ok(db)
    }

    fn snapshot(&self, db: &Database) {
        let target = self.next_snapshot_path();
        match db.save_to_file_with(&target, false, &self.config.backup_suffix) {
            Ok(()) => tracing::info!("Saved snapshot to {}", target.display()),
            Err(e) => tracing::error!("Failed to save snapshot to {}: {}", target.display(), e),
        }
    }
}
