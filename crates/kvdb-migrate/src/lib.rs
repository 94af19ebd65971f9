//! # kvdb-migrate
//!
//! Storage backend migration for blockchain node data directories.
//!
//! A node keeps its state in `<home>/data` as several embedded key-value
//! databases next to plain files. This library converts every database to a
//! different storage engine and swaps the result into place:
//!
//! - **Classification** of the data directory into databases and other entries
//! - **Batch conversion** with a bounded in-memory write batch per database
//! - **Verbatim copy** of everything that is not a database
//! - **Backup and swap** of the data directory, keeping the original
//! - **Node config update** of the `db_backend` setting
//!
//! ## Example
//!
//! ```rust,no_run
//! use kvdb_migrate::{BackendCatalog, BackendType, MigrationConfig, Orchestrator};
//!
//! fn main() -> kvdb_migrate::Result<()> {
//!     let catalog = BackendCatalog::with_builtins();
//!     let config = MigrationConfig::new("/home/node", BackendType::GoLevelDb, BackendType::Redb);
//!     let orchestrator = Orchestrator::new(&catalog);
//!     let plan = orchestrator.plan(&config)?;
//!     let result = orchestrator.execute(&plan)?;
//!     println!("Migrated {} entries", result.entries_total);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod orchestrator;
pub mod transfer;

// Re-exports for convenient access
pub use backend::{BackendCatalog, BackendType, KvStore, OpenMode, WriteBatch};
pub use classify::{get_data_dir_contents, split_db_path, DirContents};
pub use config::{read_db_backend, update_db_backend, MigrationConfig};
pub use detect::detect_backend;
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationPhase, MigrationPlan, MigrationResult, Orchestrator};
pub use transfer::{TransferConfig, TransferEngine, TransferJob, TransferStats, BYTES_PER_MB};
