//! Environment cache with content-hash invalidation.
//!
//! # Caching Strategy
//!
//! ```text
//! EnvironmentCache (one per serving instance)
//! ├── base: TempDir
//! │   └── env-<hash(endpoint key)>/   one directory per environment
//! ├── libraries: Vec<Library>         overlaid into every environment
//! └── RwLock<FxHashMap<key, Arc<Environment>>>
//!     └── Environment
//!         └── Mutex<BuildState>  ─── content-hash gated rebuild
//! ```
//!
//! Lookups share the map's read lock. Only inserting a new environment takes
//! the write lock, and only for as long as it takes to create its directory.
//! Population runs under the environment's own lock, so two requests for the
//! same endpoint never rebuild concurrently and requests for different
//! endpoints never wait on each other.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tempfile::TempDir;

use super::environment::{BuildState, Environment, Layout};
use super::library::Library;
use super::populate::populate;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::{ContentHash, endpoint_id, hash_file};
use crate::path::normalize_path;

/// Endpoint key for a resolved physical script path.
pub fn endpoint_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Drop a query-string artifact accidentally carried in a path.
fn strip_query(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.split_once('?')) {
        Some((before, _)) => PathBuf::from(before),
        None => path.to_path_buf(),
    }
}

/// Cache of materialized environments, keyed by endpoint key.
///
/// # Example
///
/// ```ignore
/// let cache = EnvironmentCache::new(&config)?
///     .with_embedded_root(vfs.scratch_dir());
/// cache.add_library_bytes(GLOBALS_PHP, "globals.php")?;
///
/// let env = cache.get_environment("/srv/app/index.php", Path::new("/srv/app/index.php"))?;
/// executor.run(env.document_root(), env.script_name());
/// ```
pub struct EnvironmentCache {
    develop: bool,
    base: TempDir,
    base_root: PathBuf,
    source_root: Option<PathBuf>,
    embedded_root: Option<PathBuf>,
    libraries: RwLock<Vec<Library>>,
    envs: RwLock<FxHashMap<String, Arc<Environment>>>,
}

impl EnvironmentCache {
    /// Create an empty cache with its own base scratch directory.
    ///
    /// Environment directories keep their location for the life of this
    /// cache. The base is a fresh `php-envs-*` directory under the temp root
    /// and is removed on drop, so a new cache starts from empty directories.
    pub fn new(config: &Config) -> Result<Self> {
        let temp_root = config.temp_root();
        fs::create_dir_all(&temp_root).map_err(|e| Error::io(&temp_root, e))?;
        let base = tempfile::Builder::new()
            .prefix("php-envs-")
            .tempdir_in(&temp_root)
            .map_err(|e| Error::io(&temp_root, e))?;
        let base_root = normalize_path(base.path());

        tracing::debug!(
            base = %base_root.display(),
            develop = config.develop,
            "environment cache created"
        );
        Ok(Self {
            develop: config.develop,
            base,
            base_root,
            source_root: config.source_root.as_deref().map(normalize_path),
            embedded_root: None,
            libraries: RwLock::new(Vec::new()),
            envs: RwLock::new(FxHashMap::default()),
        })
    }

    /// Mirror the whole tree of `root` into environments whose script lives under it.
    pub fn with_source_root(mut self, root: impl AsRef<Path>) -> Self {
        self.source_root = Some(normalize_path(root.as_ref()));
        self
    }

    /// Treat scripts under `root` as self-contained embedded scripts.
    pub fn with_embedded_root(mut self, root: impl AsRef<Path>) -> Self {
        self.embedded_root = Some(normalize_path(root.as_ref()));
        self
    }

    /// Base directory holding every environment.
    pub fn base_dir(&self) -> &Path {
        &self.base_root
    }

    /// The configured source root.
    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }

    /// Whether origins are re-hashed on every access.
    pub fn is_develop(&self) -> bool {
        self.develop
    }

    // =========================================================================
    // Libraries
    // =========================================================================

    /// Register a real file overlaid at `relative` in every environment.
    ///
    /// Applies to environments built or rebuilt from now on.
    pub fn add_library(&self, real: impl AsRef<Path>, relative: &str) -> Result<()> {
        self.push_library(Library::file(real, relative)?);
        Ok(())
    }

    /// Register in-memory content overlaid at `relative` in every environment.
    pub fn add_library_bytes(
        &self,
        content: impl Into<bytes::Bytes>,
        relative: &str,
    ) -> Result<()> {
        self.push_library(Library::bytes(content, relative)?);
        Ok(())
    }

    fn push_library(&self, library: Library) {
        tracing::debug!(library = %library.relative(), "registered global library");
        let mut libraries = self.libraries.write();
        libraries.retain(|l| l.relative() != library.relative());
        libraries.push(library);
    }

    /// Relative paths of every registered library.
    pub fn libraries(&self) -> Vec<String> {
        self.libraries
            .read()
            .iter()
            .map(|l| l.relative().to_string())
            .collect()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Return the environment for `key`, creating or rebuilding it as needed.
    ///
    /// A new environment is populated on first use. An existing one is
    /// repopulated when its stored hash was cleared, and in development mode
    /// also when the origin's content hash changed.
    pub fn get_environment(&self, key: &str, origin: &Path) -> Result<Arc<Environment>> {
        let origin = strip_query(origin);
        let existing = self.envs.read().get(key).cloned();
        let env = match existing {
            Some(env) => env,
            None => self.create_environment(key, &origin)?,
        };
        self.ensure_current(&env)?;
        Ok(env)
    }

    /// The environment for `key`, if one exists. Never builds.
    pub fn get(&self, key: &str) -> Option<Arc<Environment>> {
        self.envs.read().get(key).cloned()
    }

    fn create_environment(&self, key: &str, origin: &Path) -> Result<Arc<Environment>> {
        let mut envs = self.envs.write();
        if let Some(env) = envs.get(key) {
            return Ok(env.clone());
        }

        let id = endpoint_id(key);
        let root = self.base_root.join(format!("env-{id}"));
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;

        let (layout, relative) = self.classify(key, origin)?;
        if layout == Layout::Detached {
            tracing::warn!(
                key,
                origin = %origin.display(),
                "origin outside source and embedded roots, relative includes may fail"
            );
        }

        tracing::info!(key, id = %id, layout = layout.as_str(), "creating environment");
        let env = Arc::new(Environment::new(
            id,
            key.to_string(),
            origin.to_path_buf(),
            root,
            relative,
            layout,
        ));
        envs.insert(key.to_string(), env.clone());
        Ok(env)
    }

    /// Decide the population layout and the script's relative path.
    fn classify(&self, key: &str, origin: &Path) -> Result<(Layout, PathBuf)> {
        let canonical = normalize_path(origin);

        if let Some(embedded) = &self.embedded_root
            && let Ok(relative) = canonical.strip_prefix(embedded)
        {
            return Ok((Layout::Embedded, relative.to_path_buf()));
        }
        if let Some(source_root) = &self.source_root
            && let Ok(relative) = canonical.strip_prefix(source_root)
        {
            let layout = Layout::SourceTree {
                source_root: source_root.clone(),
            };
            return Ok((layout, relative.to_path_buf()));
        }

        let name = canonical
            .file_name()
            .ok_or_else(|| Error::environment(key, "origin has no file name"))?;
        Ok((Layout::Detached, PathBuf::from(name)))
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    fn ensure_current(&self, env: &Environment) -> Result<()> {
        let mut state = env.state.lock();
        match state.hash.clone() {
            None => {
                let hash = hash_file(env.origin())?;
                self.populate(env, &mut state, Some(hash))
            }
            Some(stored) if self.develop => match hash_file(env.origin()) {
                Ok(hash) if hash == stored => {
                    tracing::debug!(key = %env.endpoint_key(), "environment current");
                    Ok(())
                }
                Ok(hash) => self.populate(env, &mut state, Some(hash)),
                Err(e) => {
                    tracing::warn!(
                        key = %env.endpoint_key(),
                        error = %e,
                        "origin unreadable, repopulating"
                    );
                    self.populate(env, &mut state, None)
                }
            },
            Some(_) => Ok(()),
        }
    }

    fn populate(
        &self,
        env: &Environment,
        state: &mut BuildState,
        hash: Option<ContentHash>,
    ) -> Result<()> {
        let libraries = self.libraries.read().clone();
        let stats = populate(env, &libraries, &self.mirror_skips()).map_err(|e| {
            // Force a retry on the next access.
            state.hash = None;
            e
        })?;

        state.hash = hash;
        state.built_at = Some(Utc::now());
        state.builds += 1;
        tracing::info!(
            key = %env.endpoint_key(),
            files = stats.files,
            libraries = stats.libraries,
            builds = state.builds,
            "environment populated"
        );
        Ok(())
    }

    /// Directories a source-tree mirror must never descend into.
    fn mirror_skips(&self) -> Vec<PathBuf> {
        let mut skips = vec![self.base_root.clone()];
        skips.extend(self.embedded_root.iter().cloned());
        skips
    }

    /// Repopulate the environment for `key` unconditionally.
    pub fn rebuild(&self, key: &str) -> Result<Arc<Environment>> {
        let env = self
            .get(key)
            .ok_or_else(|| Error::environment(key, "no such environment"))?;
        {
            let mut state = env.state.lock();
            let hash = hash_file(env.origin())?;
            self.populate(&env, &mut state, Some(hash))?;
        }
        Ok(env)
    }

    /// Clear the stored hash of `key`, forcing a rebuild on next access.
    ///
    /// Returns whether an environment exists for `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        match self.get(key) {
            Some(env) => {
                env.state.lock().hash = None;
                tracing::debug!(key, "environment invalidated");
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Remove one environment's directory and evict it.
    ///
    /// Returns whether an environment existed for `key`.
    pub fn cleanup_environment(&self, key: &str) -> Result<bool> {
        let Some(env) = self.envs.write().remove(key) else {
            return Ok(false);
        };
        let _guard = env.state.lock();
        match fs::remove_dir_all(env.root()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(env.root(), e)),
        }
        tracing::debug!(key, "environment removed");
        Ok(true)
    }

    /// Evict every environment and remove their directories.
    ///
    /// The base directory itself goes away when the cache is dropped.
    pub fn cleanup(&self) -> Result<()> {
        self.envs.write().clear();
        let base = self.base.path();
        for entry in fs::read_dir(base).map_err(|e| Error::io(base, e))? {
            let path = entry.map_err(|e| Error::io(base, e))?.path();
            fs::remove_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        }
        tracing::debug!(base = %self.base_root.display(), "environment cache cleaned up");
        Ok(())
    }

    /// Get the number of environments.
    pub fn len(&self) -> usize {
        self.envs.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.envs.read().is_empty()
    }

    /// Endpoint keys of every environment, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.envs.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for EnvironmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentCache")
            .field("base", &self.base_root)
            .field("source_root", &self.source_root)
            .field("embedded_root", &self.embedded_root)
            .field("environments", &self.len())
            .finish()
    }
}
