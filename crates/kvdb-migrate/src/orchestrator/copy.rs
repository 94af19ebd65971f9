//! Verbatim copy of non-database entries into the staging directory.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Copy the file, directory or symlink at `src` to `dst`, recursively.
///
/// Symlinks are recreated rather than followed. Directories are created
/// writable and get their source permissions only after their contents are
/// in place, deepest first. Returns the number of regular files copied.
pub fn copy_entry(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut files = 0;
    let mut dirs = Vec::new();
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            let permissions = entry.metadata().map_err(io::Error::from)?.permissions();
            dirs.push((target, permissions));
        } else {
            fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }

    // Pre-order walk, so reversing puts children before their parents.
    for (dir, permissions) in dirs.into_iter().rev() {
        fs::set_permissions(&dir, permissions)?;
    }
    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_single_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("priv_validator_state.json");
        fs::write(&src, br#"{"height":"42"}"#).unwrap();
        let dst = tmp.path().join("staging/priv_validator_state.json");

        assert_eq!(copy_entry(&src, &dst).unwrap(), 1);
        assert_eq!(fs::read(&dst).unwrap(), br#"{"height":"42"}"#);
    }

    #[test]
    fn test_copy_directory_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("wasm");
        fs::create_dir_all(src.join("state/wasm")).unwrap();
        fs::create_dir_all(src.join("empty")).unwrap();
        fs::write(src.join("a.wasm"), b"a").unwrap();
        fs::write(src.join("state/wasm/b.wasm"), b"bb").unwrap();

        let dst = tmp.path().join("staging/wasm");
        assert_eq!(copy_entry(&src, &dst).unwrap(), 2);
        assert_eq!(fs::read(dst.join("state/wasm/b.wasm")).unwrap(), b"bb");
        assert!(dst.join("empty").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_recreated() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("cs.wal");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("wal"), b"w").unwrap();
        std::os::unix::fs::symlink("wal", src.join("latest")).unwrap();

        let dst = tmp.path().join("out/cs.wal");
        copy_entry(&src, &dst).unwrap();
        let link = dst.join("latest");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("wal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("wasm");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.wasm"), b"a").unwrap();
        fs::write(src.join("sub/b.wasm"), b"b").unwrap();
        fs::set_permissions(src.join("sub"), fs::Permissions::from_mode(0o555)).unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o555)).unwrap();

        let dst = tmp.path().join("out/wasm");
        let copied = copy_entry(&src, &dst);

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        let dst_modes = (mode(&dst), mode(&dst.join("sub")));
        for dir in [&src, &dst] {
            fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
            fs::set_permissions(dir.join("sub"), fs::Permissions::from_mode(0o755)).unwrap();
        }

        assert_eq!(copied.unwrap(), 2);
        assert_eq!(dst_modes, (0o555, 0o555));
        assert_eq!(fs::read(dst.join("sub/b.wasm")).unwrap(), b"b");
    }

    #[test]
    fn test_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(copy_entry(&tmp.path().join("nope"), &tmp.path().join("dst")).is_err());
    }
}
