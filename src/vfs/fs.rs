//! The layered virtual filesystem.
//!
//! ```text
//! VirtualFs
//! ├── scratch: TempDir                  (removed when the VFS is dropped)
//! ├── files: virtual path ─► VirtualFile
//! │   ├── Source   ─► real file on disk (never written, never deleted)
//! │   ├── Embedded ─► bundle bytes extracted once into scratch
//! │   └── Virtual  ─► in-memory bytes, mirrored into scratch
//! ├── by_source: real path ─► virtual path
//! └── invalidated: paths whose backing content changed or was removed since last use
//! ```
//!
//! Mutations take the instance-wide write lock for their whole duration,
//! including the disk I/O they perform. Reads share the read lock.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tempfile::TempDir;

use super::bundle::{Bundle, BundleEntry, bundle_join};
use super::glob;
use super::watch::Watcher;
use crate::config::Config;
use crate::env::{Environment, EnvironmentCache, endpoint_key};
use crate::error::{Error, Result};
use crate::fsutil::{remove_quietly, write_atomic};
use crate::hash::{ContentHash, content_hash, hash_file};
use crate::path::{VIRTUAL_ROOT, join_virtual, normalize_path, normalize_virtual, scratch_location};

// =============================================================================
// Origin
// =============================================================================

/// Where the content of a virtual file comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// A real file on disk.
    Source,
    /// A bundled file extracted into the scratch root.
    Embedded,
    /// In-memory content mirrored into the scratch root.
    Virtual,
}

impl Origin {
    /// Lowercase name of the origin.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Embedded => "embedded",
            Self::Virtual => "virtual",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listed virtual file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Normalized virtual path.
    pub path: String,
    /// Origin of the content.
    pub origin: Origin,
    /// Physical path an execution request uses.
    pub physical: PathBuf,
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug, Clone)]
struct VirtualFile {
    origin: Origin,
    /// Real path for `Source`, scratch mirror otherwise.
    physical: PathBuf,
    hash: ContentHash,
    /// Authoritative bytes for `Virtual`. Dropped when the mirror is edited
    /// on disk, after which reads fall back to the mirror.
    content: Option<Bytes>,
}

#[derive(Default)]
struct State {
    files: FxHashMap<String, VirtualFile>,
    by_source: FxHashMap<PathBuf, String>,
    invalidated: FxHashSet<String>,
}

impl State {
    /// Register `file` at `vpath`, replacing any previous mapping.
    ///
    /// Returns whether a previous mapping was replaced.
    fn insert(&mut self, vpath: String, file: VirtualFile) -> bool {
        let replaced = self.detach(&vpath, Some(file.physical.as_path()));
        if file.origin == Origin::Source {
            self.by_source.insert(file.physical.clone(), vpath.clone());
        }
        if replaced {
            self.invalidated.insert(vpath.clone());
        }
        self.files.insert(vpath, file);
        replaced
    }

    /// Remove the mapping at `vpath`, cleaning up its scratch mirror.
    ///
    /// The path stays invalidated: a file registered there later reuses the
    /// same endpoint key, and its environment must not serve the old script.
    fn remove(&mut self, vpath: &str) -> bool {
        let removed = self.detach(vpath, None);
        if removed {
            self.invalidated.insert(vpath.to_string());
        }
        removed
    }

    fn detach(&mut self, vpath: &str, keep: Option<&Path>) -> bool {
        let Some(old) = self.files.remove(vpath) else {
            return false;
        };
        match old.origin {
            Origin::Source => {
                if self.by_source.get(&old.physical).is_some_and(|v| v == vpath) {
                    self.by_source.remove(&old.physical);
                }
            }
            Origin::Embedded | Origin::Virtual => {
                if keep != Some(old.physical.as_path()) {
                    remove_quietly(&old.physical);
                }
            }
        }
        true
    }

    fn get(&self, vpath: &str) -> Result<&VirtualFile> {
        self.files.get(vpath).ok_or_else(|| Error::NotFound {
            path: PathBuf::from(vpath),
        })
    }

    fn read_content(&self, vpath: &str) -> Result<Bytes> {
        let file = self.get(vpath)?;
        if let Some(content) = &file.content {
            return Ok(content.clone());
        }
        fs::read(&file.physical)
            .map(Bytes::from)
            .map_err(|e| Error::io(&file.physical, e))
    }
}

/// Shared part of a [`VirtualFs`], reachable from the watch thread.
pub(crate) struct Inner {
    scratch: TempDir,
    scratch_root: PathBuf,
    state: RwLock<State>,
    dirty: AtomicBool,
}

impl Inner {
    /// Insert a mapping; replacing an existing one marks the filesystem dirty.
    fn commit(&self, state: &mut State, vpath: String, file: VirtualFile) {
        if state.insert(vpath, file) {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Write `content` into the scratch mirror of `vpath`.
    fn materialize(&self, vpath: &str, origin: Origin, content: Bytes) -> Result<VirtualFile> {
        let physical = scratch_location(&self.scratch_root, vpath);
        write_atomic(&physical, &content)?;
        Ok(VirtualFile {
            origin,
            physical,
            hash: content_hash(&content),
            content: (origin == Origin::Virtual).then_some(content),
        })
    }

    /// Re-hash every backing file once and invalidate the ones that changed.
    pub(crate) fn check_changes(&self) -> Vec<String> {
        let snapshot: Vec<(String, PathBuf, ContentHash)> = self
            .state
            .read()
            .files
            .iter()
            .map(|(vpath, file)| (vpath.clone(), file.physical.clone(), file.hash.clone()))
            .collect();

        let changed = rehash(snapshot);
        if changed.is_empty() {
            return Vec::new();
        }

        let mut state = self.state.write();
        let mut invalidated = Vec::new();
        for (vpath, physical, old, new) in changed {
            let Some(file) = state.files.get_mut(&vpath) else {
                continue;
            };
            // Re-registered while we were hashing.
            if file.physical != physical || file.hash != old {
                continue;
            }
            file.hash = new;
            file.content = None;
            state.invalidated.insert(vpath.clone());
            invalidated.push(vpath);
        }

        if !invalidated.is_empty() {
            self.dirty.store(true, Ordering::Release);
            tracing::debug!(count = invalidated.len(), "virtual files changed on disk");
        }
        invalidated
    }
}

type Changed = (String, PathBuf, ContentHash, ContentHash);

fn rehash_one((vpath, physical, old): (String, PathBuf, ContentHash)) -> Option<Changed> {
    match hash_file(&physical) {
        Ok(new) if new != old => Some((vpath, physical, old, new)),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(
                path = %vpath,
                physical = %physical.display(),
                error = %e,
                "cannot hash watched file"
            );
            None
        }
    }
}

#[cfg(feature = "parallel")]
fn rehash(snapshot: Vec<(String, PathBuf, ContentHash)>) -> Vec<Changed> {
    use rayon::prelude::*;
    snapshot.into_par_iter().filter_map(rehash_one).collect()
}

#[cfg(not(feature = "parallel"))]
fn rehash(snapshot: Vec<(String, PathBuf, ContentHash)>) -> Vec<Changed> {
    snapshot.into_iter().filter_map(rehash_one).collect()
}

/// Validate and normalize a virtual path that must name a file.
fn file_path(vpath: &str) -> Result<String> {
    let vpath = normalize_virtual(vpath)?;
    if vpath == VIRTUAL_ROOT {
        return Err(Error::invalid_path(vpath, "the virtual root cannot hold a file"));
    }
    Ok(vpath)
}

/// Build a `Source` entry for a real file.
fn source_file(real: &Path) -> Result<VirtualFile> {
    let meta = fs::metadata(real).map_err(|e| Error::io(real, e))?;
    if meta.is_dir() {
        return Err(Error::IsDirectory {
            path: real.to_path_buf(),
        });
    }
    Ok(VirtualFile {
        origin: Origin::Source,
        physical: real.to_path_buf(),
        hash: hash_file(real)?,
        content: None,
    })
}

// =============================================================================
// VirtualFs
// =============================================================================

/// A per-instance virtual filesystem composing source, embedded and virtual files.
///
/// # Example
///
/// ```ignore
/// let vfs = VirtualFs::new(&config)?;
/// vfs.add_source_directory("./public", "/")?;
/// vfs.add_embedded_file(&assets, "lib/init.php", "/lib/init.php")?;
/// vfs.create_virtual_file("/health.php", "<?php echo 'ok';")?;
///
/// let env = vfs.environment_for("/index.php", &cache)?;
/// ```
pub struct VirtualFs {
    inner: Arc<Inner>,
    develop: bool,
    watch_interval: std::time::Duration,
    watcher: Mutex<Option<Watcher>>,
}

impl VirtualFs {
    /// Create an empty filesystem with its own scratch root.
    pub fn new(config: &Config) -> Result<Self> {
        let temp_root = config.temp_root();
        fs::create_dir_all(&temp_root).map_err(|e| Error::io(&temp_root, e))?;
        let scratch = tempfile::Builder::new()
            .prefix("php-vfs-")
            .tempdir_in(&temp_root)
            .map_err(|e| Error::io(&temp_root, e))?;
        let scratch_root = normalize_path(scratch.path());

        tracing::debug!(scratch = %scratch_root.display(), "virtual filesystem created");
        Ok(Self {
            inner: Arc::new(Inner {
                scratch,
                scratch_root,
                state: RwLock::new(State::default()),
                dirty: AtomicBool::new(false),
            }),
            develop: config.develop,
            watch_interval: config.watch_interval,
            watcher: Mutex::new(None),
        })
    }

    /// Root of the private scratch directory.
    pub fn scratch_dir(&self) -> &Path {
        &self.inner.scratch_root
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a real file at `vpath`.
    ///
    /// Fails if the file does not exist or is a directory. Starts change
    /// watching in development mode.
    pub fn add_source_file(&self, real: impl AsRef<Path>, vpath: &str) -> Result<()> {
        let vpath = file_path(vpath)?;
        let real = normalize_path(real.as_ref());
        let file = source_file(&real)?;

        self.inner.commit(&mut self.inner.state.write(), vpath.clone(), file);
        tracing::debug!(path = %vpath, real = %real.display(), "registered source file");

        self.ensure_watching();
        Ok(())
    }

    /// Register every file covered by a directory path, file path or glob
    /// under `prefix`.
    ///
    /// Files that fail individually are logged and skipped. Returns the number
    /// of files registered.
    pub fn add_source_directory(&self, pattern: &str, prefix: &str) -> Result<usize> {
        let prefix = normalize_virtual(prefix)?;
        let matches = glob::expand(pattern)?;

        let mut registered = 0;
        {
            let mut state = self.inner.state.write();
            for m in matches {
                let entry = join_virtual(&prefix, &m.relative)
                    .and_then(|vpath| Ok((vpath, source_file(&normalize_path(&m.real))?)));
                match entry {
                    Ok((vpath, file)) => {
                        self.inner.commit(&mut state, vpath, file);
                        registered += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %m.real.display(),
                            error = %e,
                            "skipping source file"
                        );
                    }
                }
            }
        }

        tracing::debug!(pattern, prefix = %prefix, registered, "registered source directory");
        self.ensure_watching();
        Ok(registered)
    }

    /// Extract one bundled file into scratch and register it at `vpath`.
    pub fn add_embedded_file(
        &self,
        bundle: &dyn Bundle,
        bundle_path: &str,
        vpath: &str,
    ) -> Result<()> {
        let vpath = file_path(vpath)?;
        let bytes = bundle.read_file(bundle_path).map_err(|source| Error::Bundle {
            path: bundle_path.to_string(),
            source,
        })?;

        let mut state = self.inner.state.write();
        let file = self.inner.materialize(&vpath, Origin::Embedded, Bytes::from(bytes))?;
        self.inner.commit(&mut state, vpath.clone(), file);
        tracing::debug!(path = %vpath, bundle_path, "registered embedded file");
        Ok(())
    }

    /// Extract a bundled directory recursively and register it under `prefix`.
    ///
    /// Entries that fail individually are logged and skipped. Returns the
    /// number of files registered.
    pub fn add_embedded_directory(
        &self,
        bundle: &dyn Bundle,
        dir: &str,
        prefix: &str,
    ) -> Result<usize> {
        let prefix = normalize_virtual(prefix)?;
        let entries = bundle.read_dir(dir).map_err(|source| Error::Bundle {
            path: dir.to_string(),
            source,
        })?;

        let mut state = self.inner.state.write();
        let registered = self.extract_dir(&mut state, bundle, dir, &prefix, entries);
        tracing::debug!(dir, prefix = %prefix, registered, "registered embedded directory");
        Ok(registered)
    }

    fn extract_dir(
        &self,
        state: &mut State,
        bundle: &dyn Bundle,
        dir: &str,
        vdir: &str,
        entries: Vec<BundleEntry>,
    ) -> usize {
        let mut registered = 0;
        for entry in entries {
            let bundle_path = bundle_join(dir, &entry.name);
            let vpath = match join_virtual(vdir, &entry.name) {
                Ok(vpath) => vpath,
                Err(e) => {
                    tracing::warn!(bundle_path = %bundle_path, error = %e, "skipping entry");
                    continue;
                }
            };

            if entry.is_dir {
                match bundle.read_dir(&bundle_path) {
                    Ok(children) => {
                        registered +=
                            self.extract_dir(state, bundle, &bundle_path, &vpath, children);
                    }
                    Err(e) => {
                        tracing::warn!(
                            bundle_path = %bundle_path,
                            error = %e,
                            "skipping embedded directory"
                        );
                    }
                }
                continue;
            }

            let file = bundle
                .read_file(&bundle_path)
                .map_err(|source| Error::Bundle {
                    path: bundle_path.clone(),
                    source,
                })
                .and_then(|bytes| {
                    self.inner.materialize(&vpath, Origin::Embedded, Bytes::from(bytes))
                });
            match file {
                Ok(file) => {
                    self.inner.commit(state, vpath, file);
                    registered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        bundle_path = %bundle_path,
                        error = %e,
                        "skipping embedded file"
                    );
                }
            }
        }
        registered
    }

    /// Register in-memory content at `vpath`.
    pub fn create_virtual_file(&self, vpath: &str, content: impl Into<Bytes>) -> Result<()> {
        let vpath = file_path(vpath)?;
        let mut state = self.inner.state.write();
        let file = self.inner.materialize(&vpath, Origin::Virtual, content.into())?;
        self.inner.commit(&mut state, vpath.clone(), file);
        tracing::debug!(path = %vpath, "created virtual file");
        Ok(())
    }

    // =========================================================================
    // Copy / Move / Delete
    // =========================================================================

    /// Copy the resolved content of `src` to `dst`.
    ///
    /// The copy is always a `Virtual` file, detached from the origin of `src`.
    pub fn copy_file(&self, src: &str, dst: &str) -> Result<()> {
        let src = file_path(src)?;
        let dst = file_path(dst)?;

        let mut state = self.inner.state.write();
        let content = state.read_content(&src)?;
        let file = self.inner.materialize(&dst, Origin::Virtual, content)?;
        self.inner.commit(&mut state, dst.clone(), file);
        tracing::debug!(src = %src, dst = %dst, "copied virtual file");
        Ok(())
    }

    /// Move `src` to `dst`.
    ///
    /// Like [`copy_file`](Self::copy_file), then drops the mapping of `src`.
    /// A real source file is never deleted from disk.
    pub fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        let src = file_path(src)?;
        let dst = file_path(dst)?;

        let mut state = self.inner.state.write();
        let content = state.read_content(&src)?;
        if src == dst {
            return Ok(());
        }
        let file = self.inner.materialize(&dst, Origin::Virtual, content)?;
        self.inner.commit(&mut state, dst.clone(), file);
        state.remove(&src);
        self.inner.dirty.store(true, Ordering::Release);
        tracing::debug!(src = %src, dst = %dst, "moved virtual file");
        Ok(())
    }

    /// Remove the mapping at `vpath`.
    ///
    /// Scratch mirrors of embedded and virtual files are removed best-effort;
    /// real source files are left untouched.
    pub fn delete_file(&self, vpath: &str) -> Result<()> {
        let vpath = file_path(vpath)?;
        if !self.inner.state.write().remove(&vpath) {
            return Err(Error::NotFound {
                path: PathBuf::from(vpath),
            });
        }
        self.inner.dirty.store(true, Ordering::Release);
        tracing::debug!(path = %vpath, "deleted virtual file");
        Ok(())
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Current bytes of `vpath`.
    pub fn get_file_content(&self, vpath: &str) -> Result<Bytes> {
        let vpath = file_path(vpath)?;
        self.inner.state.read().read_content(&vpath)
    }

    /// The physical path an execution request for `vpath` should use.
    pub fn resolve_path(&self, vpath: &str) -> Result<PathBuf> {
        let vpath = file_path(vpath)?;
        Ok(self.inner.state.read().get(&vpath)?.physical.clone())
    }

    /// Origin of `vpath`, if registered.
    pub fn origin(&self, vpath: &str) -> Option<Origin> {
        let vpath = normalize_virtual(vpath).ok()?;
        self.inner.state.read().files.get(&vpath).map(|f| f.origin)
    }

    /// Check if `vpath` is registered.
    pub fn exists(&self, vpath: &str) -> bool {
        self.origin(vpath).is_some()
    }

    /// Virtual path a real source file is registered at.
    pub fn virtual_path_of(&self, real: impl AsRef<Path>) -> Option<String> {
        let real = normalize_path(real.as_ref());
        self.inner.state.read().by_source.get(&real).cloned()
    }

    /// All registered files, sorted by virtual path.
    pub fn list_files(&self) -> Vec<FileEntry> {
        let mut entries: Vec<FileEntry> = self
            .inner
            .state
            .read()
            .files
            .iter()
            .map(|(path, file)| FileEntry {
                path: path.clone(),
                origin: file.origin,
                physical: file.physical.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Get the number of registered files.
    pub fn len(&self) -> usize {
        self.inner.state.read().files.len()
    }

    /// Check if no file is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Change Detection
    // =========================================================================

    /// Run one change-detection pass now. Returns the newly invalidated paths.
    pub fn check_changes(&self) -> Vec<String> {
        self.inner.check_changes()
    }

    /// Whether any path is waiting to be refreshed.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Paths waiting to be refreshed, sorted.
    pub fn invalidated_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.state.read().invalidated.iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Consume the invalidation of `vpath`, if any.
    ///
    /// Clears the stored hash of the backing environment so the next
    /// [`EnvironmentCache::get_environment`] rebuilds it. Returns whether
    /// `vpath` was invalidated.
    pub fn refresh_if_needed(&self, vpath: &str, cache: &EnvironmentCache) -> bool {
        let Ok(vpath) = normalize_virtual(vpath) else {
            return false;
        };
        if !self.inner.state.read().invalidated.contains(&vpath) {
            return false;
        }

        let physical = {
            let mut state = self.inner.state.write();
            // A deleted path keeps its mark until something is registered there again.
            let Some(physical) = state.files.get(&vpath).map(|f| f.physical.clone()) else {
                return false;
            };
            if !state.invalidated.remove(&vpath) {
                return false;
            }
            if state.invalidated.is_empty() {
                self.inner.dirty.store(false, Ordering::Release);
            }
            physical
        };

        cache.invalidate(&endpoint_key(&physical));
        tracing::debug!(path = %vpath, "refreshed invalidated path");
        true
    }

    /// Resolve `vpath` and return its ready-to-execute environment.
    pub fn environment_for(
        &self,
        vpath: &str,
        cache: &EnvironmentCache,
    ) -> Result<Arc<Environment>> {
        let vpath = file_path(vpath)?;
        let physical = self.resolve_path(&vpath)?;
        self.refresh_if_needed(&vpath, cache);
        cache.get_environment(&endpoint_key(&physical), &physical)
    }

    // =========================================================================
    // Watching / Shutdown
    // =========================================================================

    fn ensure_watching(&self) {
        if self.develop
            && let Err(e) = self.start_watching()
        {
            tracing::warn!(error = %e, "cannot start change watch");
        }
    }

    /// Start the background change watch. No-op if already running.
    pub fn start_watching(&self) -> Result<()> {
        let mut watcher = self.watcher.lock();
        if watcher.is_none() {
            *watcher = Some(Watcher::spawn(Arc::downgrade(&self.inner), self.watch_interval)
                .map_err(|e| Error::io(&self.inner.scratch_root, e))?);
            tracing::debug!(interval = ?self.watch_interval, "change watch started");
        }
        Ok(())
    }

    /// Stop the background change watch and wait for it to exit.
    pub fn stop_watching(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    /// Whether the background change watch is running.
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stop watching, drop every mapping and empty the scratch root.
    ///
    /// The scratch root itself is removed when the filesystem is dropped.
    pub fn shutdown(&self) -> Result<()> {
        self.stop_watching();
        let mut state = self.inner.state.write();
        *state = State::default();
        self.inner.dirty.store(false, Ordering::Release);

        let root = self.inner.scratch.path();
        for entry in fs::read_dir(root).map_err(|e| Error::io(root, e))? {
            let path = entry.map_err(|e| Error::io(root, e))?.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }
}

impl Drop for VirtualFs {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

impl fmt::Debug for VirtualFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFs")
            .field("scratch", &self.inner.scratch_root)
            .field("files", &self.len())
            .field("watching", &self.is_watching())
            .finish()
    }
}
