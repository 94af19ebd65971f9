//! Backend detection from on-disk file signatures.
//!
//! Detection only looks at file names directly inside the database directory.
//! It is advisory: the orchestrator compares the result against the declared
//! source backend and warns on a mismatch, but always opens with the declared one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::{BackendCatalog, BackendType, DB_DIR_SUFFIX, REDB_FILE_NAME};

/// Detect which backend created the database `name` inside `containing_dir`.
///
/// The candidate directory is `containing_dir/name` if that is a directory,
/// otherwise `containing_dir/name.db`. Returns `None` when no signature matches
/// or the directory cannot be read.
pub fn detect_backend(
    name: &str,
    containing_dir: &Path,
    catalog: &BackendCatalog,
) -> Option<BackendType> {
    let dir = candidate_dir(name, containing_dir);
    let files = match list_file_names(&dir) {
        Some(files) => files,
        None => {
            debug!("Cannot list {}; backend unknown", dir.display());
            return None;
        }
    };
    let has = |f: &str| files.contains(f);

    if has("KEYREGISTRY") && has("MANIFEST") {
        return Some(BackendType::BadgerDb);
    }
    if has("CURRENT") && has("LOG") {
        if has("IDENTITY") {
            return Some(BackendType::RocksDb);
        }
        return Some(leveldb_flavor(catalog));
    }
    if has(REDB_FILE_NAME) {
        return Some(BackendType::Redb);
    }
    None
}

/// Both LevelDB identifiers share one on-disk format. Prefer `goleveldb`,
/// then `cleveldb`, whichever is available.
fn leveldb_flavor(catalog: &BackendCatalog) -> BackendType {
    if catalog.is_available(BackendType::GoLevelDb) {
        BackendType::GoLevelDb
    } else if catalog.is_available(BackendType::CLevelDb) {
        BackendType::CLevelDb
    } else {
        BackendType::GoLevelDb
    }
}

fn candidate_dir(name: &str, containing_dir: &Path) -> PathBuf {
    let plain = containing_dir.join(name);
    if plain.is_dir() {
        plain
    } else {
        containing_dir.join(format!("{}{}", name, DB_DIR_SUFFIX))
    }
}

fn list_file_names(dir: &Path) -> Option<HashSet<String>> {
    let entries = std::fs::read_dir(dir).ok()?;
    Some(
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LevelDbStore;
    use std::fs;
    use tempfile::TempDir;

    fn touch_all(dir: &Path, files: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        for f in files {
            fs::write(dir.join(f), b"").unwrap();
        }
    }

    fn goleveldb_only() -> BackendCatalog {
        let mut catalog = BackendCatalog::new();
        catalog.register(BackendType::GoLevelDb, LevelDbStore::open_boxed);
        catalog
    }

    #[test]
    fn test_detect_badger() {
        let tmp = TempDir::new().unwrap();
        touch_all(&tmp.path().join("badger"), &["KEYREGISTRY", "MANIFEST", "000001.vlog"]);
        assert_eq!(
            detect_backend("badger", tmp.path(), &goleveldb_only()),
            Some(BackendType::BadgerDb)
        );
    }

    #[test]
    fn test_detect_rocks() {
        let tmp = TempDir::new().unwrap();
        touch_all(
            &tmp.path().join("rocks.db"),
            &["CURRENT", "LOG", "IDENTITY", "MANIFEST-000004"],
        );
        assert_eq!(
            detect_backend("rocks", tmp.path(), &goleveldb_only()),
            Some(BackendType::RocksDb)
        );
    }

    #[test]
    fn test_detect_leveldb_prefers_goleveldb() {
        let tmp = TempDir::new().unwrap();
        touch_all(&tmp.path().join("golevel.db"), &["CURRENT", "LOG", "LOCK"]);
        assert_eq!(
            detect_backend("golevel", tmp.path(), &goleveldb_only()),
            Some(BackendType::GoLevelDb)
        );
    }

    #[test]
    fn test_detect_leveldb_falls_back_to_cleveldb() {
        let tmp = TempDir::new().unwrap();
        touch_all(&tmp.path().join("clevel.db"), &["CURRENT", "LOG"]);
        let mut catalog = BackendCatalog::new();
        catalog.register(BackendType::CLevelDb, LevelDbStore::open_boxed);
        assert_eq!(
            detect_backend("clevel", tmp.path(), &catalog),
            Some(BackendType::CLevelDb)
        );
        assert_eq!(
            detect_backend("clevel", tmp.path(), &BackendCatalog::new()),
            Some(BackendType::GoLevelDb)
        );
    }

    #[test]
    fn test_detect_redb() {
        let tmp = TempDir::new().unwrap();
        touch_all(&tmp.path().join("evidence.db"), &[REDB_FILE_NAME]);
        assert_eq!(
            detect_backend("evidence", tmp.path(), &goleveldb_only()),
            Some(BackendType::Redb)
        );
    }

    #[test]
    fn test_detect_unknown() {
        let tmp = TempDir::new().unwrap();
        let catalog = goleveldb_only();

        touch_all(&tmp.path().join("empty.db"), &[]);
        assert_eq!(detect_backend("empty", tmp.path(), &catalog), None);

        touch_all(&tmp.path().join("only_current.db"), &["CURRENT"]);
        assert_eq!(detect_backend("only_current", tmp.path(), &catalog), None);

        assert_eq!(detect_backend("does_not_exist", tmp.path(), &catalog), None);
    }

    #[test]
    fn test_plain_directory_wins_over_suffixed() {
        let tmp = TempDir::new().unwrap();
        touch_all(&tmp.path().join("state"), &["KEYREGISTRY", "MANIFEST"]);
        touch_all(&tmp.path().join("state.db"), &["CURRENT", "LOG"]);
        assert_eq!(
            detect_backend("state", tmp.path(), &goleveldb_only()),
            Some(BackendType::BadgerDb)
        );
    }
}
