//! Temporary files and buffer reservation.
//!
//! Every temporary file pixmill creates carries the [`TEMP_PREFIX`] prefix
//! and is owned by a guard from `tempfile` that deletes it when dropped, so
//! error paths clean up the same way success paths do.

use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempDir, TempPath};

use crate::error::{IoError, IoResult, ResourceErrorKind};

/// Name prefix of every temporary file and directory.
pub const TEMP_PREFIX: &str = "pixmill-";

fn temp_error(err: std::io::Error) -> IoError {
    IoError::resource(ResourceErrorKind::TemporaryFile, err.to_string())
}

/// Creates a temporary file in the system temporary directory.
pub fn unique_file() -> IoResult<NamedTempFile> {
    Builder::new().prefix(TEMP_PREFIX).tempfile().map_err(temp_error)
}

/// Creates a temporary file in `dir`, used for write-then-rename.
pub fn unique_file_in(dir: &Path) -> IoResult<NamedTempFile> {
    Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(temp_error)
}

/// Creates a temporary file with `suffix` and returns only its path guard.
pub fn unique_path(suffix: &str) -> IoResult<TempPath> {
    Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile()
        .map(NamedTempFile::into_temp_path)
        .map_err(temp_error)
}

/// Creates a scratch directory removed with everything in it on drop.
pub fn unique_dir() -> IoResult<TempDir> {
    Builder::new().prefix(TEMP_PREFIX).tempdir().map_err(temp_error)
}

/// Directory a write to `target` should stage its temporary file in.
pub fn staging_dir(target: &str) -> PathBuf {
    match Path::new(target).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Allocates a zeroed buffer, reporting failure instead of aborting.
pub fn acquire_buffer<T: Clone + Default>(count: usize) -> IoResult<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(count).map_err(|e| {
        IoError::resource(
            ResourceErrorKind::AllocationFailed,
            format!("{count} elements: {e}"),
        )
    })?;
    buffer.resize(count, T::default());
    Ok(buffer)
}
