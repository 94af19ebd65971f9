//! Migration configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::BackendType;
use crate::transfer::{TransferConfig, BYTES_PER_MB};

/// Name of the data directory under the node home.
pub const DATA_DIR_NAME: &str = "data";

/// `chrono` format used in backup and staging directory names.
pub const DEFAULT_DIR_DATE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Directory mode used when the source data directory's mode is unavailable.
pub const DEFAULT_DIR_MODE: u32 = 0o700;

/// Settings for one backend migration of a node home directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Node home directory (holds `data/` and `config/`).
    pub home: PathBuf,

    /// Backend the existing databases were written with.
    pub source_backend: BackendType,

    /// Backend to convert every database to.
    pub target_backend: BackendType,

    /// Data directory to migrate (default: `<home>/data`).
    #[serde(default)]
    pub source_data_dir: Option<PathBuf>,

    /// Parent of the backup directory (default: home).
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Full backup directory path. Overrides the dated name under `backup_dir`.
    #[serde(default)]
    pub backup_data_dir: Option<PathBuf>,

    /// Parent of the staging directory (default: home).
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Batch flush threshold in key + value bytes (0 = unlimited).
    #[serde(default = "default_batch_size_bytes")]
    pub batch_size_bytes: u64,

    /// Seconds between status log lines (minimum 1).
    #[serde(default = "default_status_period_secs")]
    pub status_period_secs: u64,

    /// Mode for created directories (default: mode of the source data directory).
    #[serde(default)]
    pub dir_mode: Option<u32>,

    /// Build the staging directory but leave the data directory in place.
    #[serde(default)]
    pub stage_only: bool,

    /// Timestamp format for dated directory names.
    #[serde(default = "default_dir_date_format")]
    pub dir_date_format: String,
}

fn default_batch_size_bytes() -> u64 {
    2048 * BYTES_PER_MB
}

fn default_status_period_secs() -> u64 {
    5
}

fn default_dir_date_format() -> String {
    DEFAULT_DIR_DATE_FORMAT.to_string()
}

impl MigrationConfig {
    /// Create a config with every optional setting at its default.
    pub fn new(home: impl Into<PathBuf>, source: BackendType, target: BackendType) -> Self {
        Self {
            home: home.into(),
            source_backend: source,
            target_backend: target,
            source_data_dir: None,
            backup_dir: None,
            backup_data_dir: None,
            staging_dir: None,
            batch_size_bytes: default_batch_size_bytes(),
            status_period_secs: default_status_period_secs(),
            dir_mode: None,
            stage_only: false,
            dir_date_format: default_dir_date_format(),
        }
    }

    /// Set the batch threshold in whole megabytes (1 MB = 1,048,576 bytes).
    pub fn with_batch_size_mb(mut self, mb: u64) -> Self {
        self.batch_size_bytes = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    /// Fill in every derived setting that was not explicitly set.
    pub fn apply_defaults(&mut self) {
        if self.source_data_dir.is_none() {
            self.source_data_dir = Some(self.home.join(DATA_DIR_NAME));
        }
        if self.backup_dir.is_none() {
            self.backup_dir = Some(self.home.clone());
        }
        if self.staging_dir.is_none() {
            self.staging_dir = Some(self.home.clone());
        }
        if self.dir_mode.is_none() {
            self.dir_mode = Some(self.get_dir_mode());
        }
        if self.status_period_secs == 0 {
            self.status_period_secs = default_status_period_secs();
        }
        if self.dir_date_format.is_empty() {
            self.dir_date_format = default_dir_date_format();
        }
    }

    pub fn get_source_data_dir(&self) -> PathBuf {
        self.source_data_dir
            .clone()
            .unwrap_or_else(|| self.home.join(DATA_DIR_NAME))
    }

    pub fn get_backup_parent(&self) -> PathBuf {
        self.backup_dir.clone().unwrap_or_else(|| self.home.clone())
    }

    pub fn get_staging_parent(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(|| self.home.clone())
    }

    pub fn get_status_period(&self) -> Duration {
        Duration::from_secs(self.status_period_secs)
    }

    /// Explicit mode, else the source data directory's mode, else 0700.
    pub fn get_dir_mode(&self) -> u32 {
        if let Some(mode) = self.dir_mode {
            return mode;
        }
        source_dir_mode(&self.get_source_data_dir()).unwrap_or(DEFAULT_DIR_MODE)
    }

    /// Converter settings derived from this config.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            batch_size_bytes: self.batch_size_bytes,
            status_period: self.get_status_period(),
            dir_mode: self.get_dir_mode(),
        }
    }
}

#[cfg(unix)]
fn source_dir_mode(dir: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(dir).ok()?.permissions().mode() & 0o7777;
    debug!("Using mode {:o} of {}", mode, dir.display());
    (mode != 0).then_some(mode)
}

#[cfg(not(unix))]
fn source_dir_mode(_dir: &Path) -> Option<u32> {
    debug!("Directory modes are not supported on this platform");
    None
}
