//! Backend catalog for explicit dependency injection.
//!
//! The [`BackendCatalog`] records which storage engines are compiled into this
//! build and how to open each of them. It is constructed once at startup and
//! passed by reference to the detector and the orchestrator, so "which backends
//! are available" is an explicit input rather than hidden global state.

use std::collections::BTreeMap;
use std::path::Path;

use super::{BackendType, KvStore, LevelDbStore, OpenMode, RedbStore};
use crate::error::{MigrateError, Result};

/// Opens the database `name` located under `dir`.
pub type OpenFn = fn(BackendType, &Path, &str, OpenMode) -> Result<Box<dyn KvStore>>;

/// Registry of the storage backends available in this build.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = BackendCatalog::with_builtins();
/// let mut db = catalog.open(BackendType::GoLevelDb, dir, "application", OpenMode::Existing)?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct BackendCatalog {
    openers: BTreeMap<BackendType, OpenFn>,
}

impl BackendCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every engine compiled into this build.
    ///
    /// `goleveldb` and `redb` are always present. `cleveldb` and `rocksdb`
    /// are added by the features of the same name.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        catalog.register(BackendType::GoLevelDb, LevelDbStore::open_boxed);
        catalog.register(BackendType::Redb, RedbStore::open_boxed);

        #[cfg(feature = "cleveldb")]
        catalog.register(BackendType::CLevelDb, LevelDbStore::open_boxed);

        #[cfg(feature = "rocksdb")]
        catalog.register(BackendType::RocksDb, super::RocksDbStore::open_boxed);

        catalog
    }

    /// Register an opener for a backend, replacing any previous one.
    pub fn register(&mut self, backend: BackendType, open: OpenFn) {
        self.openers.insert(backend, open);
    }

    /// Check if a backend is available.
    pub fn is_available(&self, backend: BackendType) -> bool {
        self.openers.contains_key(&backend)
    }

    /// Fail with the available set if `backend` is not compiled in.
    pub fn require(&self, backend: BackendType) -> Result<()> {
        self.opener(backend).map(|_| ())
    }

    fn opener(&self, backend: BackendType) -> Result<OpenFn> {
        self.openers
            .get(&backend)
            .copied()
            .ok_or_else(|| MigrateError::BackendUnavailable {
                backend,
                available: self.available_names().join(", "),
            })
    }

    /// Parse an identifier and make sure it is available.
    pub fn require_named(&self, name: &str) -> Result<BackendType> {
        let backend: BackendType = name.parse()?;
        self.require(backend)?;
        Ok(backend)
    }

    /// All available backend identifiers in a stable order.
    pub fn available_names(&self) -> Vec<&'static str> {
        self.openers.keys().map(BackendType::as_str).collect()
    }

    /// Open the database `name` under `dir` with the given backend.
    pub fn open(
        &self,
        backend: BackendType,
        dir: &Path,
        name: &str,
        mode: OpenMode,
    ) -> Result<Box<dyn KvStore>> {
        let open = self.opener(backend)?;
        open(backend, dir, name, mode)
    }
}
