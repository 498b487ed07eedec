//! Filesystem primitives used as a key-value lookup by the pipeline.
//!
//! Existence checks are not transactional: a file can appear or vanish
//! between a check and the copy that follows it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ForcingError, Result};

/// Create `dir` and all missing parents.
///
/// Safe to call concurrently for the same path: losing a creation race to
/// another worker counts as success.
pub fn ensure_directory(dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(ForcingError::io(dir, e)),
    }
}

/// Whether `path` names an existing regular file.
pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

/// Copy bytes unchanged from `source` to `dest`, overwriting `dest`.
///
/// The error names `source` when it cannot be read, `dest` otherwise.
pub fn copy_file(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<u64> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    let bytes = std::fs::copy(source, dest).map_err(|e| {
        let failed = if source.is_file() { dest } else { source };
        ForcingError::io(failed, e)
    })?;
    debug!(source = %source.display(), dest = %dest.display(), bytes, "Copied file");
    Ok(bytes)
}

/// Create an empty file at `path`, or leave an existing one untouched.
pub fn touch(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| ForcingError::io(path, e))
}

/// All regular files below `root`, in lexicographic path order.
pub fn list_files_recursive(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::new(ErrorKind::Other, "filesystem loop"));
            ForcingError::io(path, source)
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
