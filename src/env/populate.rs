//! Environment population.
//!
//! Contents are overwritten in place, never replaced: files removed from the
//! origin tree stay in the environment until it is cleaned up.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::environment::{Environment, Layout};
use super::library::Library;
use crate::error::{Error, Result};
use crate::fsutil::copy_atomic;

/// What one population pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PopulateStats {
    /// Files copied by the main step.
    pub files: usize,
    /// Libraries overlaid.
    pub libraries: usize,
}

/// Populate `env` according to its layout, then overlay `libraries`.
///
/// Main-step failures abort; a failing library is logged and skipped.
pub(crate) fn populate(
    env: &Environment,
    libraries: &[Library],
    skip: &[PathBuf],
) -> Result<PopulateStats> {
    let files = match env.layout() {
        Layout::SourceTree { source_root } => mirror_tree(source_root, env.root(), skip)?,
        Layout::Embedded | Layout::Detached => {
            copy_atomic(env.origin(), &env.script_path())?;
            1
        }
    };

    let mut installed = 0;
    for library in libraries {
        match library.install(env.root()) {
            Ok(()) => installed += 1,
            Err(e) => {
                tracing::warn!(
                    key = %env.endpoint_key(),
                    library = %library.relative(),
                    error = %e,
                    "library overlay failed"
                );
            }
        }
    }

    Ok(PopulateStats {
        files,
        libraries: installed,
    })
}

/// Copy every file under `src` to the same relative location under `dst`.
///
/// Directories listed in `skip` are not descended into, and symlinked
/// directories are not followed.
pub(crate) fn mirror_tree(src: &Path, dst: &Path, skip: &[PathBuf]) -> Result<usize> {
    let mut pairs: Vec<(PathBuf, PathBuf)> = Vec::new();
    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !skip.iter().any(|s| entry.path().starts_with(s)));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            match e.into_io_error() {
                Some(source) => Error::io(path, source),
                None => Error::invalid_path(path.to_string_lossy(), "filesystem loop"),
            }
        })?;
        let file_type = entry.file_type();
        let is_file = file_type.is_file() || (file_type.is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        pairs.push((entry.path().to_path_buf(), dst.join(relative)));
    }

    copy_all(&pairs)?;
    Ok(pairs.len())
}

#[cfg(feature = "parallel")]
fn copy_all(pairs: &[(PathBuf, PathBuf)]) -> Result<()> {
    use rayon::prelude::*;
    pairs
        .par_iter()
        .try_for_each(|(src, dst)| copy_atomic(src, dst).map(|_| ()))
}

#[cfg(not(feature = "parallel"))]
fn copy_all(pairs: &[(PathBuf, PathBuf)]) -> Result<()> {
    pairs
        .iter()
        .try_for_each(|(src, dst)| copy_atomic(src, dst).map(|_| ()))
}
