//! Global libraries overlaid into every environment.
//!
//! A library is a file every script may rely on (for example a superglobal
//! initialization script). It is copied into each environment after the main
//! population step, so it always wins over a mirrored file at the same path.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::fsutil::{copy_atomic, write_atomic};
use crate::path::{VIRTUAL_ROOT, normalize_path, normalize_virtual};

/// Where a library's bytes come from.
#[derive(Debug, Clone)]
pub enum LibrarySource {
    /// A real file, read at every overlay.
    File(PathBuf),
    /// Fixed in-memory content.
    Bytes(Bytes),
}

/// A file installed at the same relative path in every environment.
#[derive(Debug, Clone)]
pub struct Library {
    relative: String,
    source: LibrarySource,
}

impl Library {
    /// A library backed by a real file.
    pub fn file(real: impl AsRef<Path>, relative: &str) -> Result<Self> {
        let real = normalize_path(real.as_ref());
        let meta = fs::metadata(&real).map_err(|e| Error::io(&real, e))?;
        if meta.is_dir() {
            return Err(Error::IsDirectory { path: real });
        }
        Ok(Self {
            relative: library_relative(relative)?,
            source: LibrarySource::File(real),
        })
    }

    /// A library with in-memory content.
    pub fn bytes(content: impl Into<Bytes>, relative: &str) -> Result<Self> {
        Ok(Self {
            relative: library_relative(relative)?,
            source: LibrarySource::Bytes(content.into()),
        })
    }

    /// Slash-separated path inside each environment.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Where the content comes from.
    pub fn source(&self) -> &LibrarySource {
        &self.source
    }

    /// Copy the library into an environment rooted at `root`.
    pub(crate) fn install(&self, root: &Path) -> Result<()> {
        let target = root.join(&self.relative);
        match &self.source {
            LibrarySource::File(real) => copy_atomic(real, &target).map(|_| ()),
            LibrarySource::Bytes(content) => write_atomic(&target, content),
        }
    }
}

fn library_relative(relative: &str) -> Result<String> {
    let normalized = normalize_virtual(relative)?;
    if normalized == VIRTUAL_ROOT {
        return Err(Error::invalid_path(relative, "library path names the root"));
    }
    Ok(normalized.trim_start_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_library_relative_is_confined() {
        let lib = Library::bytes("<?php", "../../lib/init.php").unwrap();
        assert_eq!(lib.relative(), "lib/init.php");
        assert!(Library::bytes("x", "/").is_err());
    }

    #[test]
    fn test_install_bytes_and_file() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("globals.php");
        fs::write(&real, "<?php // globals").unwrap();
        let root = dir.path().join("env");

        Library::file(&real, "/globals.php").unwrap().install(&root).unwrap();
        Library::bytes("<?php // init", "lib/init.php").unwrap().install(&root).unwrap();

        assert_eq!(fs::read(root.join("globals.php")).unwrap(), b"<?php // globals");
        assert_eq!(fs::read(root.join("lib/init.php")).unwrap(), b"<?php // init");
    }

    #[test]
    fn test_file_library_must_exist() {
        let dir = TempDir::new().unwrap();
        assert!(Library::file(dir.path().join("nope.php"), "nope.php").unwrap_err().is_not_found());
        assert!(matches!(
            Library::file(dir.path(), "dir.php").unwrap_err(),
            Error::IsDirectory { .. }
        ));
    }
}
