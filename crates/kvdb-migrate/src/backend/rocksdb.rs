//! RocksDB engine (feature `rocksdb`).

use std::path::Path;

use ::rocksdb::{IteratorMode, Options, WriteBatch as RocksWriteBatch, WriteOptions, DB};
use tracing::debug;

use super::{BackendType, KvStore, OpenMode, ScanVisitor, WriteBatch};
use crate::error::{MigrateError, Result};

/// An open RocksDB database stored in `<dir>/<name>.db`.
pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    pub fn open(dir: &Path, name: &str, mode: OpenMode) -> Result<Self> {
        let path = BackendType::RocksDb.db_path(dir, name);
        let mut opts = Options::default();
        opts.create_if_missing(mode == OpenMode::CreateIfMissing);

        debug!("Opening rocksdb database at {}", path.display());
        let db = DB::open(&opts, &path).map_err(rocks_err)?;
        Ok(Self { db })
    }

    pub(crate) fn open_boxed(
        _backend: BackendType,
        dir: &Path,
        name: &str,
        mode: OpenMode,
    ) -> Result<Box<dyn KvStore>> {
        Ok(Box::new(Self::open(dir, name, mode)?))
    }
}

fn rocks_err(e: ::rocksdb::Error) -> MigrateError {
    MigrateError::backend(BackendType::RocksDb, e)
}

impl KvStore for RocksDbStore {
    fn backend(&self) -> BackendType {
        BackendType::RocksDb
    }

    fn scan(&mut self, visit: &mut ScanVisitor<'_>) -> Result<()> {
        for entry in self.db.iterator(IteratorMode::Start) {
            let (key, value) = entry.map_err(rocks_err)?;
            visit(&key, &value)?;
        }
        Ok(())
    }

    fn write(&mut self, batch: &WriteBatch) -> Result<()> {
        let mut native = RocksWriteBatch::default();
        for (key, value) in batch.iter() {
            native.put(key, value);
        }
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        self.db.write_opt(native, &opts).map_err(rocks_err)
    }
}
