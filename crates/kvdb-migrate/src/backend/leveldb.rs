//! LevelDB-format engine.
//!
//! Serves both the `goleveldb` and `cleveldb` identifiers: the on-disk format
//! (`CURRENT`, `LOG`, `MANIFEST-*`, `*.ldb`) is the same for both.

use std::path::Path;

use rusty_leveldb::{LdbIterator, Options, WriteBatch as LdbWriteBatch, DB};
use tracing::debug;

use super::{BackendType, KvStore, OpenMode, ScanVisitor, WriteBatch};
use crate::error::{MigrateError, Result};

/// An open LevelDB database.
pub struct LevelDbStore {
    backend: BackendType,
    db: DB,
}

impl LevelDbStore {
    /// Open the database stored in `<dir>/<name>.db`.
    pub fn open(backend: BackendType, dir: &Path, name: &str, mode: OpenMode) -> Result<Self> {
        let path = backend.db_path(dir, name);
        let mut opt = Options::default();
        opt.create_if_missing = mode == OpenMode::CreateIfMissing;

        debug!("Opening {} database at {}", backend, path.display());
        let db = DB::open(&path, opt).map_err(|e| MigrateError::backend(backend, e))?;
        Ok(Self { backend, db })
    }

    pub(crate) fn open_boxed(
        backend: BackendType,
        dir: &Path,
        name: &str,
        mode: OpenMode,
    ) -> Result<Box<dyn KvStore>> {
        Ok(Box::new(Self::open(backend, dir, name, mode)?))
    }
}

impl KvStore for LevelDbStore {
    fn backend(&self) -> BackendType {
        self.backend
    }

    fn scan(&mut self, visit: &mut ScanVisitor<'_>) -> Result<()> {
        let mut iter = self
            .db
            .new_iter()
            .map_err(|e| MigrateError::backend(self.backend, e))?;

        let mut key = Vec::new();
        let mut value = Vec::new();
        while iter.advance() {
            if !iter.current(&mut key, &mut value) {
                break;
            }
            visit(&key, &value)?;
        }
        Ok(())
    }

    fn write(&mut self, batch: &WriteBatch) -> Result<()> {
        let mut native = LdbWriteBatch::new();
        for (key, value) in batch.iter() {
            native.put(key, value);
        }
        self.db
            .write(native, true)
            .map_err(|e| MigrateError::backend(self.backend, e))
    }
}
