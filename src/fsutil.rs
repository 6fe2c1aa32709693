//! Atomic file writes.
//!
//! Every file placed in a scratch root or an environment goes through a
//! temporary sibling and a rename, so concurrent readers see either the old
//! or the new content, never a partial write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Write `bytes` to `path`, creating parent directories as needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = temp_sibling(path)?;
    tmp.write_all(bytes).map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Copy `src` to `dst`, creating parent directories as needed.
pub(crate) fn copy_atomic(src: &Path, dst: &Path) -> Result<u64> {
    let mut input = File::open(src).map_err(|e| Error::io(src, e))?;
    let mut tmp = temp_sibling(dst)?;
    let copied = io::copy(&mut input, &mut tmp).map_err(|e| Error::io(dst, e))?;
    tmp.persist(dst).map_err(|e| Error::io(dst, e.error))?;
    Ok(copied)
}

/// Remove a file, ignoring errors. Returns whether it was removed.
pub(crate) fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "could not remove scratch file"
                );
            }
            false
        }
    }
}

fn temp_sibling(path: &Path) -> Result<NamedTempFile> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::invalid_path(path.to_string_lossy(), "no parent directory"))?;
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))
}
