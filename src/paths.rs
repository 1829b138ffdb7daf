//! File naming helpers for saved databases and snapshots

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Append `.db` unless the path already ends with it
pub fn with_db_extension(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "db") {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".db");
    PathBuf::from(name)
}

/// First free name among `data.db`, `data(1).db`, `data(2).db`, ...
pub fn unique_filename(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}({}).{}", stem, counter, ext),
            None => format!("{}({})", stem, counter),
        };
        let candidate = path.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// `dir/test.db` + `_snapshot.db` → `dir/test_snapshot.db`
pub fn snapshot_path(db_path: &Path, suffix: &str) -> PathBuf {
    let base = db_path.with_extension("");
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
