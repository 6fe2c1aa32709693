//! Embedded bundle trait and implementations.
//!
//! A [`Bundle`] is any read-only container of files compiled into (or shipped
//! alongside) the host binary. The VFS extracts bundle files once into its
//! scratch root; after that the bundle is no longer consulted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

// =============================================================================
// Bundle Trait
// =============================================================================

/// One entry of a bundle directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// File or directory name (no slashes).
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl BundleEntry {
    /// A file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_dir: false }
    }

    /// A directory entry.
    pub fn dir(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_dir: true }
    }
}

/// Read-only access to bundled files.
///
/// Paths are slash-separated and relative to the bundle root; `""` and `"."`
/// name the root itself. A leading slash is tolerated.
///
/// # Example
///
/// ```ignore
/// use php_vfs::{Bundle, BundleEntry};
///
/// struct Assets;
///
/// impl Bundle for Assets {
///     fn read_file(&self, path: &str) -> std::io::Result<Vec<u8>> {
///         match path {
///             "lib/init.php" => Ok(include_bytes!("../php/lib/init.php").to_vec()),
///             _ => Err(std::io::ErrorKind::NotFound.into()),
///         }
///     }
///
///     fn read_dir(&self, path: &str) -> std::io::Result<Vec<BundleEntry>> {
///         match path {
///             "" | "." => Ok(vec![BundleEntry::dir("lib")]),
///             "lib" => Ok(vec![BundleEntry::file("init.php")]),
///             _ => Err(std::io::ErrorKind::NotFound.into()),
///         }
///     }
/// }
/// ```
pub trait Bundle: Send + Sync {
    /// Read a bundled file.
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    /// List a bundled directory.
    fn read_dir(&self, path: &str) -> io::Result<Vec<BundleEntry>>;
}

/// Strip leading slashes and the `.` root marker from a bundle path.
pub(crate) fn bundle_key(path: &str) -> &str {
    let path = path.trim_start_matches('/').trim_end_matches('/');
    if path == "." { "" } else { path }
}

/// Join a bundle directory and an entry name.
pub(crate) fn bundle_join(dir: &str, name: &str) -> String {
    match bundle_key(dir) {
        "" => name.to_string(),
        dir => format!("{dir}/{name}"),
    }
}

// =============================================================================
// MapBundle - In-Memory Implementation
// =============================================================================

/// A simple map-based bundle.
///
/// Directories are implied by the file paths inserted.
///
/// # Example
///
/// ```
/// use php_vfs::{Bundle, MapBundle};
///
/// let mut bundle = MapBundle::new();
/// bundle.insert("lib/init.php", "<?php // init");
/// assert_eq!(bundle.read_dir("lib").unwrap().len(), 1);
/// ```
#[derive(Default, Clone)]
pub struct MapBundle {
    files: FxHashMap<String, Vec<u8>>,
}

impl MapBundle {
    /// Create a new empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file with string content.
    pub fn insert(&mut self, path: impl AsRef<str>, content: impl AsRef<str>) {
        self.insert_bytes(path, content.as_ref().as_bytes().to_vec());
    }

    /// Insert a file with binary content.
    pub fn insert_bytes(&mut self, path: impl AsRef<str>, content: impl Into<Vec<u8>>) {
        self.files
            .insert(bundle_key(path.as_ref()).to_string(), content.into());
    }

    /// Get the number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Bundle for MapBundle {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(bundle_key(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} not in bundle")))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<BundleEntry>> {
        let dir = bundle_key(path);
        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };

        let mut entries: Vec<BundleEntry> = Vec::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let entry = match rest.split_once('/') {
                Some((name, _)) => BundleEntry::dir(name),
                None => BundleEntry::file(rest),
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }

        if entries.is_empty() && !dir.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{path} not in bundle")));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

// =============================================================================
// DirBundle - Directory-Backed Implementation
// =============================================================================

/// A real directory exposed as a bundle.
///
/// Useful for assets installed next to the binary rather than compiled in.
#[derive(Debug, Clone)]
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    /// Create a bundle rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn locate(&self, path: &str) -> io::Result<PathBuf> {
        let key = bundle_key(path);
        if key.split('/').any(|s| s == "..") {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "path escapes bundle"));
        }
        Ok(self.root.join(key))
    }
}

impl Bundle for DirBundle {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.locate(path)?)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<BundleEntry>> {
        let mut entries = fs::read_dir(self.locate(path)?)?
            .map(|entry| {
                let entry = entry?;
                Ok(BundleEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    is_dir: entry.file_type()?.is_dir(),
                })
            })
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
