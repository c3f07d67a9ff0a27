//! Configuration file handling for resync.
//!
//! Looks for `.config/resync.styx` in the current directory or any parent directory.

pub use resync_config::Config;

use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = ".config/resync.styx";

/// Load configuration from `.config/resync.styx`, searching up the directory tree.
pub fn load() -> Result<(Config, PathBuf), ConfigError> {
    let cwd = std::env::current_dir()?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Path) -> Result<(Config, PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let content = std::fs::read_to_string(&config_path)?;

    let config: Config =
        facet_styx::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    Ok((config, config_path))
}

/// Like [`load`], but falls back to defaults when no config file exists.
pub fn load_or_default() -> Result<(Config, Option<PathBuf>), ConfigError> {
    match load() {
        Ok((config, path)) => Ok((config, Some(path))),
        Err(ConfigError::NotFound) => Ok((Config::default(), None)),
        Err(e) => Err(e),
    }
}

/// Directory that paths in the config are relative to: the one holding `.config/`.
pub fn project_root(config_path: &Path) -> &Path {
    config_path
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."))
}

/// Find `.config/resync.styx` by searching up the directory tree.
fn find_config_file(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no {} found in the current directory or any parent", CONFIG_FILE)]
    NotFound,

    #[error("failed to read {}: {0}", CONFIG_FILE)]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {0}", CONFIG_FILE)]
    Parse(String),
}
