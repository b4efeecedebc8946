//! File system helpers for outputs that other runs may read.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::ResourceError;

/// Create `dir` and its parents if missing.
pub fn ensure_directory(dir: &Path) -> Result<(), ResourceError> {
    std::fs::create_dir_all(dir).map_err(|e| ResourceError::unwritable(dir, e))
}

/// Write `bytes` to `path` so readers see either the old file or the complete new one.
///
/// The content goes to a temporary file in the destination directory first and is
/// then renamed over `path`. The parent directory is created if missing.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ResourceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_directory(dir)?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| ResourceError::unwritable(dir, e))?;
    file.write_all(bytes).map_err(|e| ResourceError::unwritable(file.path(), e))?;
    file.as_file().sync_all().map_err(|e| ResourceError::unwritable(file.path(), e))?;
    file.persist(path).map_err(|e| ResourceError::unwritable(path, e.error))?;
    Ok(())
}
