//! Application configuration and per-user paths.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "PatientCare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Store file name inside the data directory.
pub const DB_FILE_NAME: &str = "patientcare.db";
/// Store format version recorded in backup metadata.
pub const DATABASE_VERSION: &str = "1.0";

/// Overrides the data directory.
pub const DATA_DIR_ENV: &str = "PATIENTCARE_DATA_DIR";
/// Log filter directive (falls back to `RUST_LOG`).
pub const LOG_ENV: &str = "PATIENTCARE_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine the user data directory; set PATIENTCARE_DATA_DIR")]
    NoDataDir,

    #[error("PATIENTCARE_DATA_DIR is set but empty")]
    EmptyDataDir,

    #[error("Cannot create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Default per-user data directory.
///
/// `%APPDATA%\PatientCare` on Windows, `~/.patientcare` elsewhere.
pub fn default_data_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_dir().map(|d| d.join(APP_NAME))
    } else {
        dirs::home_dir().map(|h| h.join(".patientcare"))
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_filter: String,
}

impl Config {
    /// Build from the environment, falling back to the per-user default directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = match env::var_os(DATA_DIR_ENV) {
            Some(dir) if dir.is_empty() => return Err(ConfigError::EmptyDataDir),
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let log_filter = env::var(LOG_ENV)
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            data_dir,
            log_filter,
        })
    }

    /// Configuration rooted at an explicit directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    /// Create the data, backups and exports directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        create_dir(&self.data_dir)?;
        create_dir(&self.backups_dir())?;
        create_dir(&self.exports_dir())
    }
}

pub(crate) fn create_dir(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_data_dir() {
        let config = Config::with_data_dir("/tmp/pc");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/pc/patientcare.db"));
        assert!(config.backups_dir().starts_with("/tmp/pc"));
        assert!(config.exports_dir().ends_with("exports"));
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_default_data_dir() {
        if let Some(dir) = default_data_dir() {
            let name = dir.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name == APP_NAME || name == ".patientcare");
        }
    }

    #[test]
    fn test_ensure_dirs_creates() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(tmp.path().join("nested").join("data"));
        config.ensure_dirs().unwrap();
        assert!(config.data_dir.is_dir());
        assert!(config.backups_dir().is_dir());
        assert!(config.exports_dir().is_dir());
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "PatientCare");
    }
}
