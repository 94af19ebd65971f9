//! Error types for the migration library.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendType;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing home, bad batch size, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend identifier that this library has never heard of.
    #[error("Unknown backend type {0:?}")]
    UnknownBackend(String),

    /// Known backend that was not compiled into this build.
    #[error("Backend {backend} is not available in this build (available: {available})")]
    BackendUnavailable {
        backend: BackendType,
        available: String,
    },

    /// Error reported by a storage engine.
    #[error("{backend} error: {message}")]
    Backend {
        backend: BackendType,
        message: String,
    },

    /// A directory could not be read during classification.
    #[error("Could not read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The data directory holds nothing that looks like a database.
    #[error("No database directories found in {}", .0.display())]
    NoDatabases(PathBuf),

    /// Conversion of a single database failed at a specific step.
    #[error("Could not {step} {db:?}: {source}")]
    Convert {
        db: String,
        step: &'static str,
        #[source]
        source: Box<MigrateError>,
    },

    /// A non-database entry could not be copied into the staging directory.
    #[error("Could not copy {entry}: {source}")]
    Copy {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    /// Moving the existing data directory to its backup location failed.
    /// Nothing has been swapped; the data directory is untouched.
    #[error(
        "Could not back up existing data directory {} to {}: {source}",
        .from.display(),
        .to.display()
    )]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving the staging directory into place failed after the backup rename.
    /// The node has no data directory until an operator moves one back.
    #[error(
        "Could not move new data directory into place: {source}\n  \
         Data directory is now missing: {}\n  \
         Original data is at: {}\n  \
         Converted data is at: {}\n  \
         Move one of them to the data directory path manually before starting the node.",
        .data_dir.display(),
        .backup_dir.display(),
        .staging_dir.display()
    )]
    Swap {
        data_dir: PathBuf,
        backup_dir: PathBuf,
        staging_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Node config file error.
    #[error("Node config error in {}: {message}", .path.display())]
    NodeConfig { path: PathBuf, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MigrateError {
    /// Create a Backend error from any displayable engine error.
    pub fn backend(backend: BackendType, err: impl std::fmt::Display) -> Self {
        MigrateError::Backend {
            backend,
            message: err.to_string(),
        }
    }

    /// Wrap an error with the database and the conversion step that failed.
    pub fn convert(db: impl Into<String>, step: &'static str, source: MigrateError) -> Self {
        MigrateError::Convert {
            db: db.into(),
            step,
            source: Box::new(source),
        }
    }

    /// True for errors raised before anything on disk was touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::UnknownBackend(_)
                | MigrateError::BackendUnavailable { .. }
                | MigrateError::NoDatabases(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_input_error() {
            2
        } else {
            1
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_names_db_and_step() {
        let err = MigrateError::convert(
            "application",
            "open source db",
            MigrateError::backend(BackendType::GoLevelDb, "LOCK held"),
        );
        let msg = err.to_string();
        assert!(msg.contains("open source db"));
        assert!(msg.contains("\"application\""));
        assert!(msg.contains("LOCK held"));
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let err = MigrateError::convert(
            "state",
            "write batch",
            MigrateError::backend(BackendType::Redb, "disk full"),
        );
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: "));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("disk full"));
    }

    #[test]
    fn test_swap_error_lists_recovery_paths() {
        let err = MigrateError::Swap {
            data_dir: PathBuf::from("/home/node/data"),
            backup_dir: PathBuf::from("/home/node/data-backup"),
            staging_dir: PathBuf::from("/home/node/data-dbmigrate-tmp"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/home/node/data-backup"));
        assert!(msg.contains("/home/node/data-dbmigrate-tmp"));
        assert!(msg.contains("manually"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::NoDatabases(PathBuf::from("/d")).exit_code(), 2);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "x");
        assert_eq!(MigrateError::Io(io).exit_code(), 1);
    }
}
