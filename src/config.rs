use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings shared by the library facade and the CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; in-memory when unset
    pub database: Option<PathBuf>,
    /// Primary-key field for tables created without an explicit one
    pub primary_key: String,
    pub backup: bool,
    pub backup_suffix: String,
    pub snapshot_suffix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            primary_key: "uuid".to_string(),
            backup: true,
            backup_suffix: ".backup".to_string(),
            snapshot_suffix: "_snapshot.db".to_string(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("recordstore.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("recordstore.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
