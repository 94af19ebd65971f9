//! redb engine.
//!
//! A redb database is a single file. To fit the `<name>.db/` directory layout
//! shared by the other backends, it lives at `<dir>/<name>.db/data.redb`, with
//! every pair stored in one byte-keyed table.

use std::path::Path;

use ::redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use tracing::debug;

use super::{BackendType, KvStore, OpenMode, ScanVisitor, WriteBatch};
use crate::error::{MigrateError, Result};

/// File name of the redb database inside its directory.
pub const REDB_FILE_NAME: &str = "data.redb";

const KV_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// An open redb database.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open the database stored in `<dir>/<name>.db/data.redb`.
    pub fn open(dir: &Path, name: &str, mode: OpenMode) -> Result<Self> {
        let db_dir = BackendType::Redb.db_path(dir, name);
        let file = db_dir.join(REDB_FILE_NAME);
        debug!("Opening redb database at {}", file.display());

        let db = match mode {
            OpenMode::Existing => {
                if !file.is_file() {
                    return Err(MigrateError::backend(
                        BackendType::Redb,
                        format!("database file {} does not exist", file.display()),
                    ));
                }
                Database::open(&file)
            }
            OpenMode::CreateIfMissing => {
                std::fs::create_dir_all(&db_dir)?;
                Database::create(&file)
            }
        }
        .map_err(|e| MigrateError::backend(BackendType::Redb, e))?;

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

fn redb_err(e: impl std::fmt::Display) -> MigrateError {
    MigrateError::backend(BackendType::Redb, e)
}

impl KvStore for RedbStore {
    fn backend(&self) -> BackendType {
        BackendType::Redb
    }

    fn scan(&mut self, visit: &mut ScanVisitor<'_>) -> Result<()> {
        let txn = self.db.begin_read().map_err(redb_err)?;
        let table = match txn.open_table(KV_TABLE) {
            Ok(table) => table,
            // Nothing was ever written.
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(redb_err(e)),
        };

        for entry in table.iter().map_err(redb_err)? {
            let (key, value) = entry.map_err(redb_err)?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }

    fn write(&mut self, batch: &WriteBatch) -> Result<()> {
        let txn = self.db.begin_write().map_err(redb_err)?;
        {
            let mut table = txn.open_table(KV_TABLE).map_err(redb_err)?;
            for (key, value) in batch.iter() {
                table.insert(key, value).map_err(redb_err)?;
            }
        }
        txn.commit().map_err(redb_err)
    }
}
