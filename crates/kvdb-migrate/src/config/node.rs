//! Node config file integration.
//!
//! The node records its storage backend as a top-level `db_backend` key in
//! `<home>/config/config.toml`. It is read to default the source backend and
//! rewritten once the converted data directory is in place.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::backend::BackendType;
use crate::error::{MigrateError, Result};

const DB_BACKEND_KEY: &str = "db_backend";

/// Path of the node config file under `home`.
pub fn node_config_path(home: &Path) -> PathBuf {
    home.join("config").join("config.toml")
}

/// Read `db_backend` from the node config.
///
/// Returns `None` when the file or the key is absent.
pub fn read_db_backend(home: &Path) -> Result<Option<BackendType>> {
    let path = node_config_path(home);
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    let doc: toml::Value = toml::from_str(&content).map_err(|e| MigrateError::NodeConfig {
        path: path.clone(),
        message: e.to_string(),
    })?;

    match doc.get(DB_BACKEND_KEY) {
        None => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(s.parse()?)),
        Some(other) => Err(MigrateError::NodeConfig {
            path,
            message: format!("{} must be a string, got {}", DB_BACKEND_KEY, other.type_str()),
        }),
    }
}

/// Set `db_backend` in the node config to `backend`.
///
/// Only the `db_backend` line is rewritten; comments and layout are kept.
/// The file is replaced atomically.
pub fn update_db_backend(home: &Path, backend: BackendType) -> Result<()> {
    let path = node_config_path(home);
    let content = fs::read_to_string(&path).map_err(|e| MigrateError::NodeConfig {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let updated = rewrite_db_backend(&content, backend).ok_or_else(|| MigrateError::NodeConfig {
        path: path.clone(),
        message: format!("no top-level {} setting found", DB_BACKEND_KEY),
    })?;

    // Atomic write: write to temp file, then rename
    let temp_path = path.with_extension("toml.tmp");
    fs::write(&temp_path, &updated)?;
    fs::rename(&temp_path, &path)?;

    info!("Updated {} to {:?} in {}", DB_BACKEND_KEY, backend.as_str(), path.display());
    Ok(())
}

/// Replace the value of the top-level `db_backend` line. `None` if there is none.
fn rewrite_db_backend(content: &str, backend: BackendType) -> Option<String> {
    let mut found = false;
    let mut in_table = false;
    let mut out = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            in_table = true;
        }

        if !found && !in_table && is_db_backend_line(trimmed) {
            let indent = &line[..line.len() - trimmed.len()];
            out.push_str(indent);
            out.push_str(&format!("{} = \"{}\"", DB_BACKEND_KEY, backend.as_str()));
            if line.ends_with('\n') {
                out.push('\n');
            }
            found = true;
        } else {
            out.push_str(line);
        }
    }

    found.then_some(out)
}

fn is_db_backend_line(trimmed: &str) -> bool {
    trimmed
        .strip_prefix(DB_BACKEND_KEY)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}
