//! Data directory classification.
//!
//! Splits a node data directory into database directories (converted) and
//! everything else (copied verbatim). Every path under the root lands in exactly
//! one of the two lists, and nothing nested inside a database is reported.

use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::DB_DIR_SUFFIX;
use crate::error::{MigrateError, Result};

/// Prefix of the manifest files written by LevelDB-family and Badger engines.
const MANIFEST_PREFIX: &str = "MANIFEST";

/// Classification of one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirContents {
    /// The directory is itself the root of a database (it holds a manifest).
    WholeDirectoryIsDatabase,
    /// Paths relative to the classified directory.
    Partitioned {
        databases: Vec<String>,
        others: Vec<String>,
    },
}

/// Partition `data_dir` into `(database paths, other paths)`, relative to `data_dir`.
///
/// Both lists follow the sorted directory listing, depth first.
pub fn get_data_dir_contents(data_dir: &Path) -> Result<(Vec<String>, Vec<String>)> {
    match classify_dir(data_dir)? {
        DirContents::Partitioned { databases, others } => Ok((databases, others)),
        DirContents::WholeDirectoryIsDatabase => Err(MigrateError::Config(format!(
            "{} is itself a database directory; point --home at the node home instead",
            data_dir.display()
        ))),
    }
}

/// Classify a single directory, recursing into subdirectories that are not
/// named `*.db`.
pub fn classify_dir(dir: &Path) -> Result<DirContents> {
    let mut databases = Vec::new();
    let mut others = Vec::new();

    for (name, is_dir) in sorted_listing(dir)? {
        if is_dir {
            if name.ends_with(DB_DIR_SUFFIX) {
                databases.push(name);
                continue;
            }

            match classify_dir(&dir.join(&name))? {
                DirContents::WholeDirectoryIsDatabase => databases.push(name),
                DirContents::Partitioned {
                    databases: sub_dbs,
                    others: sub_others,
                } => {
                    if sub_dbs.is_empty() {
                        // Nothing to convert below here: copy it as one entry.
                        others.push(name);
                    } else {
                        databases.extend(sub_dbs.iter().map(|p| join_rel(&name, p)));
                        others.extend(sub_others.iter().map(|p| join_rel(&name, p)));
                    }
                }
            }
        } else if name.starts_with(MANIFEST_PREFIX) {
            return Ok(DirContents::WholeDirectoryIsDatabase);
        } else {
            others.push(name);
        }
    }

    Ok(DirContents::Partitioned { databases, others })
}

/// Split `base/rel` into its containing directory and the database name,
/// with a trailing `.db` removed.
///
/// `split_db_path("/foo", "bar/baz.db")` gives `("/foo/bar", "baz")`.
pub fn split_db_path(base: &Path, rel: &str) -> (PathBuf, String) {
    let full = base.join(rel);
    let parent = full
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| base.to_path_buf());
    let file_name = full
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = file_name
        .strip_suffix(DB_DIR_SUFFIX)
        .map(str::to_string)
        .unwrap_or(file_name);
    (parent, name)
}

fn join_rel(prefix: &str, rel: &str) -> String {
    Path::new(prefix).join(rel).to_string_lossy().into_owned()
}

fn sorted_listing(dir: &Path) -> Result<Vec<(String, bool)>> {
    let read_err = |source: std::io::Error| MigrateError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let is_dir = entry.file_type().map_err(read_err)?.is_dir();
        entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_typical_node_data_dir() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path();
        for db in ["application.db", "blockstore.db", "state.db", "tx_index.db"] {
            touch(&data.join(db).join("CURRENT"));
        }
        touch(&data.join("snapshots/metadata.db/CURRENT"));
        touch(&data.join("snapshots/1000/chunk"));
        touch(&data.join("cs.wal/wal"));
        touch(&data.join("priv_validator_state.json"));
        touch(&data.join("wasm/wasm/state/wasm/abc"));

        let (dbs, others) = get_data_dir_contents(data).unwrap();
        assert_eq!(
            dbs,
            strings(&[
                "application.db",
                "blockstore.db",
                "snapshots/metadata.db",
                "state.db",
                "tx_index.db",
            ])
        );
        assert_eq!(
            others,
            strings(&["cs.wal", "priv_validator_state.json", "snapshots/1000", "wasm"])
        );
    }

    #[test]
    fn test_empty_db_dir_is_a_database() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("foo.db")).unwrap();

        let (dbs, others) = get_data_dir_contents(tmp.path()).unwrap();
        assert_eq!(dbs, strings(&["foo.db"]));
        assert!(others.is_empty());
    }

    #[test]
    fn test_manifest_marks_whole_directory() {
        let tmp = TempDir::new().unwrap();
        let badger = tmp.path().join("badger");
        touch(&badger.join("000001.vlog"));
        touch(&badger.join("KEYREGISTRY"));
        touch(&badger.join("MANIFEST"));
        touch(&badger.join("zzz/ignored"));

        assert_eq!(
            classify_dir(&badger).unwrap(),
            DirContents::WholeDirectoryIsDatabase
        );

        let (dbs, others) = get_data_dir_contents(tmp.path()).unwrap();
        assert_eq!(dbs, strings(&["badger"]));
        assert!(others.is_empty());
    }

    #[test]
    fn test_subtree_without_databases_collapses() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("app.db/CURRENT"));
        touch(&tmp.path().join("wasm/a/b/c.wasm"));
        touch(&tmp.path().join("wasm/d.wasm"));
        fs::create_dir(tmp.path().join("empty")).unwrap();

        let (dbs, others) = get_data_dir_contents(tmp.path()).unwrap();
        assert_eq!(dbs, strings(&["app.db"]));
        assert_eq!(others, strings(&["empty", "wasm"]));
    }

    #[test]
    fn test_data_dir_that_is_a_database_is_rejected() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("MANIFEST-000001"));
        assert!(matches!(
            get_data_dir_contents(tmp.path()),
            Err(MigrateError::Config(_))
        ));
    }

    #[test]
    fn test_missing_dir_reports_path() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        match get_data_dir_contents(&missing) {
            Err(MigrateError::ReadDir { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected ReadDir error, got {:?}", other),
        }
    }

    #[test]
    fn test_split_db_path() {
        assert_eq!(
            split_db_path(Path::new("/foo"), "bar/baz.db"),
            (PathBuf::from("/foo/bar"), "baz".to_string())
        );
        assert_eq!(
            split_db_path(Path::new("/foo/bar"), "baz"),
            (PathBuf::from("/foo/bar"), "baz".to_string())
        );
        assert_eq!(
            split_db_path(Path::new("/foo"), "baz.db2"),
            (PathBuf::from("/foo"), "baz.db2".to_string())
        );
        assert_eq!(
            split_db_path(Path::new("/foo"), "bar.db/baz.db"),
            (PathBuf::from("/foo/bar.db"), "baz".to_string())
        );
    }
}
