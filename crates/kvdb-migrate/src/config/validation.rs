//! Configuration validation.

use super::MigrationConfig;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
///
/// Backend availability is checked against the catalog at planning time.
pub fn validate(config: &MigrationConfig) -> Result<()> {
    if config.home.as_os_str().is_empty() {
        return Err(MigrateError::Config("home is required".into()));
    }

    // Cannot migrate to the same backend
    if config.source_backend == config.target_backend {
        return Err(MigrateError::Config(format!(
            "source and target backends are both '{}'",
            config.source_backend
        )));
    }

    if config.status_period_secs < 1 {
        return Err(MigrateError::Config(format!(
            "status period {}s cannot be less than 1s",
            config.status_period_secs
        )));
    }

    if let Some(0) = config.dir_mode {
        return Err(MigrateError::Config("dir_mode cannot be 0".into()));
    }
    if let Some(mode) = config.dir_mode {
        if mode > 0o7777 {
            return Err(MigrateError::Config(format!(
                "dir_mode {:o} is not a valid permission mode",
                mode
            )));
        }
    }

    if config.dir_date_format.is_empty() {
        return Err(MigrateError::Config("dir_date_format is required".into()));
    }

    if let Some(ref backup) = config.backup_data_dir {
        if *backup == config.get_source_data_dir() {
            return Err(MigrateError::Config(
                "backup directory cannot be the data directory".into(),
            ));
        }
    }

    Ok(())
}
