//! Storage backends.
//!
//! A node data directory holds one or more embedded key-value databases, each
//! written by a specific engine. This module defines:
//!
//! - [`BackendType`]: the closed set of backend identifiers
//! - [`KvStore`]: the seam every engine implements (open, scan, batch write)
//! - [`WriteBatch`]: the engine-agnostic, size-tracked batch of pending writes
//! - [`BackendCatalog`]: the set of backends compiled into this build
//!
//! # Adding a backend
//!
//! 1. Add a variant to [`BackendType`] and its identifier
//! 2. Implement [`KvStore`] in a new module
//! 3. Register an opener in [`BackendCatalog::with_builtins`]
//! 4. Gate the engine with a feature flag in `Cargo.toml` if it links native code

mod catalog;
mod leveldb;
mod redb;
#[cfg(feature = "rocksdb")]
mod rocksdb;

pub use catalog::{BackendCatalog, OpenFn};
pub use leveldb::LevelDbStore;
pub use self::redb::{RedbStore, REDB_FILE_NAME};
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksDbStore;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Suffix used by backends that name their database directories `<name>.db`.
pub const DB_DIR_SUFFIX: &str = ".db";

/// Identifier of an embedded key-value storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// LevelDB on-disk format (pure Rust engine).
    #[serde(rename = "goleveldb")]
    GoLevelDb,
    /// LevelDB on-disk format, the identifier used by nodes built against C LevelDB.
    #[serde(rename = "cleveldb")]
    CLevelDb,
    /// RocksDB.
    #[serde(rename = "rocksdb")]
    RocksDb,
    /// BadgerDB. Recognized on disk but there is no engine for it.
    #[serde(rename = "badgerdb")]
    BadgerDb,
    /// redb single-file B-tree store.
    #[serde(rename = "redb")]
    Redb,
}

impl BackendType {
    /// Every identifier this library knows about, available or not.
    pub const ALL: [BackendType; 5] = [
        BackendType::GoLevelDb,
        BackendType::CLevelDb,
        BackendType::RocksDb,
        BackendType::BadgerDb,
        BackendType::Redb,
    ];

    /// The identifier string (as used in node config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::GoLevelDb => "goleveldb",
            BackendType::CLevelDb => "cleveldb",
            BackendType::RocksDb => "rocksdb",
            BackendType::BadgerDb => "badgerdb",
            BackendType::Redb => "redb",
        }
    }

    /// Whether the backend stores a database under `<name>.db` rather than `<name>`.
    pub fn uses_db_suffix(&self) -> bool {
        !matches!(self, BackendType::BadgerDb)
    }

    /// Directory holding the named database under `dir`.
    pub fn db_path(&self, dir: &Path, name: &str) -> PathBuf {
        if self.uses_db_suffix() {
            dir.join(format!("{}{}", name, DB_DIR_SUFFIX))
        } else {
            dir.join(name)
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        BackendType::ALL
            .into_iter()
            .find(|b| b.as_str() == lower)
            .ok_or_else(|| MigrateError::UnknownBackend(s.to_string()))
    }
}

/// How a database should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The database must already exist (source side).
    Existing,
    /// Create the database if it does not exist (target side).
    CreateIfMissing,
}

/// Pending key/value writes for one target database.
///
/// The size is measured as the sum of key and value lengths, not disk usage.
#[derive(Debug, Default)]
pub struct WriteBatch {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    size_bytes: u64,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key/value pair. An empty value is kept as an empty value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.size_bytes += (key.len() + value.len()) as u64;
        self.entries.push((key.to_vec(), value.to_vec()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accumulated key + value bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

/// Callback invoked for every key/value pair during a scan.
pub type ScanVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<()> + 'a;

/// An open embedded database.
///
/// Handles release their engine resources (file locks, caches) when dropped,
/// so a store is closed on every exit path, including early returns via `?`.
pub trait KvStore {
    /// The backend this store was opened with.
    fn backend(&self) -> BackendType;

    /// Visit every key/value pair in forward key order.
    ///
    /// Stops at the first error returned by the engine or by `visit`.
    fn scan(&mut self, visit: &mut ScanVisitor<'_>) -> Result<()>;

    /// Durably write all entries of `batch`.
    fn write(&mut self, batch: &WriteBatch) -> Result<()>;
}
