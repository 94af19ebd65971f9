//! Batch converter.
//!
//! Streams every key/value pair of one database from the source backend into a
//! freshly created database of the target backend. Pairs are accumulated into a
//! [`WriteBatch`] and written synchronously whenever the batch reaches the byte
//! threshold, so memory use is bounded by the threshold rather than the database.

mod progress;

pub use progress::comma_string;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::{BackendCatalog, BackendType, KvStore, OpenMode, WriteBatch};
use crate::classify::split_db_path;
use crate::error::{MigrateError, Result};
use progress::BatchProgress;

/// One mebibyte, the unit of the CLI batch size.
pub const BYTES_PER_MB: u64 = 1_048_576;

/// Default interval between status log lines.
pub const DEFAULT_STATUS_PERIOD: Duration = Duration::from_secs(5);

/// Conversion job for a single database.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Database path relative to the data directory (e.g. `snapshots/metadata.db`).
    pub db: String,

    /// Data directory the source database lives in.
    pub source_root: PathBuf,

    /// Staging directory the target database is created in.
    pub target_root: PathBuf,

    /// Backend of the source database.
    pub source: BackendType,

    /// Backend to convert to.
    pub target: BackendType,
}

/// Converter tuning.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Flush threshold in key + value bytes. 0 means a single batch.
    pub batch_size_bytes: u64,
    /// Minimum interval between status log lines while scanning.
    pub status_period: Duration,
    /// Mode for directories created under the staging root (unix only).
    pub dir_mode: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size_bytes: 2048 * BYTES_PER_MB,
            status_period: DEFAULT_STATUS_PERIOD,
            dir_mode: 0o700,
        }
    }
}

/// Statistics from one converted database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Entries written to the target.
    pub entries: u64,
    /// Batches written to the target.
    pub batches: u64,
    /// Key + value bytes written to the target.
    pub bytes: u64,
    /// Wall time spent on this database.
    pub duration: Duration,
}

/// Converts databases between backends.
pub struct TransferEngine<'a> {
    catalog: &'a BackendCatalog,
    config: TransferConfig,
}

impl<'a> TransferEngine<'a> {
    pub fn new(catalog: &'a BackendCatalog, config: TransferConfig) -> Self {
        Self { catalog, config }
    }

    /// Copy every entry of `job.db` into the target backend.
    ///
    /// Batches already written are not rolled back when a later step fails.
    /// Both database handles are closed on every return path.
    pub fn convert_database(&self, job: &TransferJob) -> Result<TransferStats> {
        let started = Instant::now();
        let (source_dir, name) = split_db_path(&job.source_root, &job.db);
        let (target_dir, _) = split_db_path(&job.target_root, &job.db);
        let fail = |step: &'static str| {
            let db = job.db.clone();
            move |e: MigrateError| MigrateError::convert(db, step, e)
        };

        info!(
            "{}: setting up ({} -> {}, from {} to {})",
            job.db,
            job.source,
            job.target,
            source_dir.display(),
            target_dir.display()
        );

        let mut source_db = self
            .catalog
            .open(job.source, &source_dir, &name, OpenMode::Existing)
            .map_err(fail("open source db"))?;

        // Nested databases (snapshots/metadata.db) need their parent directory.
        if target_dir != job.target_root {
            create_dir_all_with_mode(&target_dir, self.config.dir_mode).map_err(|e| {
                MigrateError::convert(job.db.clone(), "create target sub-directory", e.into())
            })?;
        }

        let mut target_db = self
            .catalog
            .open(job.target, &target_dir, &name, OpenMode::CreateIfMissing)
            .map_err(fail("open target db"))?;

        info!("{}: starting", job.db);
        let mut progress = BatchProgress::new(started, self.config.status_period);
        let mut batch = WriteBatch::new();
        let threshold = self.config.batch_size_bytes;

        let scanned = source_db.scan(&mut |key, value| {
            batch.put(key, value);
            progress.record(key.len() + value.len());

            if threshold > 0 && batch.size_bytes() >= threshold {
                info!(db = %job.db, "{}", progress.line("Writing intermediate batch"));
                write_batch(target_db.as_mut(), &batch).map_err(fail("write batch"))?;
                progress.batch_written();
                batch = WriteBatch::new();
                debug!(db = %job.db, "{}", progress.line("Starting new batch"));
            } else if progress.status_due() {
                info!(db = %job.db, "{}", progress.line("Status"));
            }
            Ok(())
        });
        if let Err(e) = scanned {
            return Err(match e {
                e @ MigrateError::Convert { .. } => e,
                other => fail("scan")(other),
            });
        }

        if !batch.is_empty() {
            info!(db = %job.db, "{}", progress.line("Writing final batch"));
            write_batch(target_db.as_mut(), &batch).map_err(fail("write batch"))?;
            progress.batch_written();
        }

        let stats = TransferStats {
            entries: progress.written_entries(),
            batches: progress.batches_written(),
            bytes: progress.written_bytes(),
            duration: started.elapsed(),
        };
        info!(
            "{}: done ({} entries in {} batches, {:.1}s)",
            job.db,
            comma_string(stats.entries),
            stats.batches,
            stats.duration.as_secs_f64()
        );
        Ok(stats)
    }
}

fn write_batch(store: &mut dyn KvStore, batch: &WriteBatch) -> Result<()> {
    debug!(
        "Writing {} entries ({} bytes) to {}",
        batch.len(),
        batch.size_bytes(),
        store.backend()
    );
    store.write(batch)
}

/// Create `path` and any missing parents with the given mode.
pub fn create_dir_all_with_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
    }

    #[cfg(not(unix))]
    {
        let _ = mode;
        std::fs::create_dir_all(path)
    }
}

/// Create the directory `path` with the given mode, failing if it exists.
///
/// Missing parents are created with default permissions.
pub fn create_new_dir_with_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new().mode(mode).create(path)
    }

    #[cfg(not(unix))]
    {
        let _ = mode;
        std::fs::create_dir(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendType::{BadgerDb, GoLevelDb, Redb};
    use tempfile::TempDir;

    fn seed(
        catalog: &BackendCatalog,
        backend: BackendType,
        root: &Path,
        db: &str,
        pairs: &[(&[u8], &[u8])],
    ) {
        let (dir, name) = split_db_path(root, db);
        std::fs::create_dir_all(&dir).unwrap();
        let mut store = catalog
            .open(backend, &dir, &name, OpenMode::CreateIfMissing)
            .unwrap();
        let mut batch = WriteBatch::new();
        for (k, v) in pairs {
            batch.put(k, v);
        }
        store.write(&batch).unwrap();
    }

    fn dump(
        catalog: &BackendCatalog,
        backend: BackendType,
        root: &Path,
        db: &str,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let (dir, name) = split_db_path(root, db);
        let mut store = catalog.open(backend, &dir, &name, OpenMode::Existing).unwrap();
        let mut out = Vec::new();
        store
            .scan(&mut |k, v| {
                out.push((k.to_vec(), v.to_vec()));
                Ok(())
            })
            .unwrap();
        out
    }

    fn job(
        db: &str,
        from: &Path,
        to: &Path,
        source: BackendType,
        target: BackendType,
    ) -> TransferJob {
        TransferJob {
            db: db.to_string(),
            source_root: from.to_path_buf(),
            target_root: to.to_path_buf(),
            source,
            target,
        }
    }

    #[test]
    fn test_round_trip_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let (a, b, c) = (tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("c"));
        for d in [&a, &b, &c] {
            std::fs::create_dir_all(d).unwrap();
        }
        let catalog = BackendCatalog::with_builtins();
        let pairs: &[(&[u8], &[u8])] = &[(b"k1", b"v1"), (b"k2", b""), (b"k3", b"value three")];
        seed(&catalog, GoLevelDb, &a, "application.db", pairs);

        let engine = TransferEngine::new(&catalog, TransferConfig::default());
        let there = engine
            .convert_database(&job("application.db", &a, &b, GoLevelDb, Redb))
            .unwrap();
        assert_eq!(there.entries, 3);
        assert_eq!(there.batches, 1);

        engine
            .convert_database(&job("application.db", &b, &c, Redb, GoLevelDb))
            .unwrap();

        let expected: Vec<(Vec<u8>, Vec<u8>)> =
            pairs.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect();
        assert_eq!(dump(&catalog, GoLevelDb, &c, "application.db"), expected);
    }

    #[test]
    fn test_small_threshold_writes_multiple_batches() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = (tmp.path().join("src"), tmp.path().join("dst"));
        std::fs::create_dir_all(&dst).unwrap();
        let catalog = BackendCatalog::with_builtins();

        let keys: Vec<String> = (0..10).map(|i| format!("key{:02}", i)).collect();
        let pairs: Vec<(&[u8], &[u8])> = keys.iter().map(|k| (k.as_bytes(), &b"val"[..])).collect();
        seed(&catalog, GoLevelDb, &src, "state.db", &pairs);

        // Each pair is 5 + 3 = 8 bytes, so a 16 byte threshold flushes every 2 pairs.
        let config = TransferConfig {
            batch_size_bytes: 16,
            ..TransferConfig::default()
        };
        let stats = TransferEngine::new(&catalog, config)
            .convert_database(&job("state.db", &src, &dst, GoLevelDb, Redb))
            .unwrap();

        assert_eq!(stats.entries, 10);
        assert_eq!(stats.batches, 5);
        assert_eq!(stats.bytes, 80);
        assert_eq!(dump(&catalog, Redb, &dst, "state.db").len(), 10);
    }

    #[test]
    fn test_unlimited_threshold_is_single_batch() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = (tmp.path().join("src"), tmp.path().join("dst"));
        std::fs::create_dir_all(&dst).unwrap();
        let catalog = BackendCatalog::with_builtins();
        seed(&catalog, GoLevelDb, &src, "evidence.db", &[(b"a", b"1"), (b"b", b"2")]);

        let config = TransferConfig {
            batch_size_bytes: 0,
            ..TransferConfig::default()
        };
        let stats = TransferEngine::new(&catalog, config)
            .convert_database(&job("evidence.db", &src, &dst, GoLevelDb, GoLevelDb))
            .unwrap();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.entries, 2);
    }

    #[test]
    fn test_nested_database_creates_target_subdir() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = (tmp.path().join("src"), tmp.path().join("dst"));
        std::fs::create_dir_all(&dst).unwrap();
        let catalog = BackendCatalog::with_builtins();
        seed(&catalog, GoLevelDb, &src, "snapshots/metadata.db", &[(b"m", b"1")]);

        TransferEngine::new(&catalog, TransferConfig::default())
            .convert_database(&job("snapshots/metadata.db", &src, &dst, GoLevelDb, Redb))
            .unwrap();
        assert!(dst.join("snapshots").is_dir());
        assert_eq!(
            dump(&catalog, Redb, &dst, "snapshots/metadata.db"),
            vec![(b"m".to_vec(), b"1".to_vec())]
        );
    }

    #[test]
    fn test_empty_source_writes_no_batches() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = (tmp.path().join("src"), tmp.path().join("dst"));
        std::fs::create_dir_all(&dst).unwrap();
        let catalog = BackendCatalog::with_builtins();
        seed(&catalog, Redb, &src, "blockstore.db", &[]);

        let stats = TransferEngine::new(&catalog, TransferConfig::default())
            .convert_database(&job("blockstore.db", &src, &dst, Redb, GoLevelDb))
            .unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.batches, 0);
        assert!(dst.join("blockstore.db").is_dir());
    }

    #[test]
    fn test_missing_source_names_step() {
        let tmp = TempDir::new().unwrap();
        let catalog = BackendCatalog::with_builtins();
        let err = TransferEngine::new(&catalog, TransferConfig::default())
            .convert_database(&job("missing.db", tmp.path(), tmp.path(), GoLevelDb, Redb))
            .unwrap_err();
        match err {
            MigrateError::Convert { db, step, .. } => {
                assert_eq!(db, "missing.db");
                assert_eq!(step, "open source db");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unavailable_target_fails_before_writing() {
        let tmp = TempDir::new().unwrap();
        let (src, dst) = (tmp.path().join("src"), tmp.path().join("dst"));
        std::fs::create_dir_all(&dst).unwrap();
        let catalog = BackendCatalog::with_builtins();
        seed(&catalog, GoLevelDb, &src, "state.db", &[(b"a", b"1")]);

        let err = TransferEngine::new(&catalog, TransferConfig::default())
            .convert_database(&job("state.db", &src, &dst, GoLevelDb, BadgerDb))
            .unwrap_err();
        assert!(err.to_string().contains("open target db"));
    }

    #[test]
    fn test_create_new_dir_rejects_existing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("parent/staging");

        create_new_dir_with_mode(&dir, 0o700).unwrap();
        assert!(dir.is_dir());
        let err = create_new_dir_with_mode(&dir, 0o700).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    }
}
