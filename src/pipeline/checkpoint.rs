//! Durable checkpoint persistence
//!
//! The checkpoint is a whole-table snapshot: the only durable copy of
//! processing progress. Saves replace the entire file and go through a
//! temp-file-then-rename sequence so a crash mid-write leaves the previous
//! snapshot intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, VecloadError};
use crate::source::RowTable;

/// Persist the full row table, including tracking fields, to `path`.
pub fn save_checkpoint(table: &RowTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| VecloadError::Io {
                source: e,
                context: format!(
                    "Failed to create checkpoint directory: {}",
                    parent.display()
                ),
            })?;
        }
    }

    let payload = serde_json::to_vec(table).map_err(|e| VecloadError::Json {
        source: e,
        context: "Failed to serialize checkpoint".to_string(),
    })?;

    let temp = temp_path(path);
    let mut file = fs::File::create(&temp).map_err(|e| VecloadError::Io {
        source: e,
        context: format!("Failed to create temp checkpoint file: {}", temp.display()),
    })?;
    file.write_all(&payload).map_err(|e| VecloadError::Io {
        source: e,
        context: format!("Failed to write checkpoint: {}", temp.display()),
    })?;
    file.sync_all().map_err(|e| VecloadError::Io {
        source: e,
        context: format!("Failed to sync checkpoint: {}", temp.display()),
    })?;
    drop(file);

    fs::rename(&temp, path).map_err(|e| VecloadError::Io {
        source: e,
        context: format!(
            "Failed to move checkpoint into place: {} -> {}",
            temp.display(),
            path.display()
        ),
    })?;

    tracing::debug!(path = %path.display(), rows = table.len(), "checkpoint saved");
    Ok(())
}

/// Load a previously saved row table, or `None` when no checkpoint exists.
pub fn load_checkpoint(path: &Path) -> Result<Option<RowTable>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read(path).map_err(|e| VecloadError::Io {
        source: e,
        context: format!("Failed to read checkpoint: {}", path.display()),
    })?;
    let table: RowTable = serde_json::from_slice(&content).map_err(|e| VecloadError::Json {
        source: e,
        context: format!("Failed to parse checkpoint: {}", path.display()),
    })?;

    tracing::info!(path = %path.display(), rows = table.len(), "checkpoint loaded");
    Ok(Some(table))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
