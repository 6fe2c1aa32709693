//! A materialized execution environment.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::hash::ContentHash;

/// How an environment is populated, decided by where its origin lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Origin lives under the source root: the whole tree is mirrored so
    /// sibling includes resolve.
    SourceTree {
        /// The mirrored source root.
        source_root: PathBuf,
    },
    /// Origin lives under the embedded scratch root: only the script is copied.
    Embedded,
    /// Origin lives outside both roots: only the script is copied and
    /// relative includes are not guaranteed.
    Detached,
}

impl Layout {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceTree { .. } => "source-tree",
            Self::Embedded => "embedded",
            Self::Detached => "detached",
        }
    }
}

/// Mutable build bookkeeping, guarded by the per-environment lock.
#[derive(Debug, Default)]
pub(crate) struct BuildState {
    /// Origin hash at the last build. `None` means never built or invalidated.
    pub hash: Option<ContentHash>,
    pub built_at: Option<DateTime<Utc>>,
    pub builds: u64,
}

/// Point-in-time view of an environment's build state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    /// Origin hash at the last build, `None` if stale.
    pub hash: Option<ContentHash>,
    /// Time of the last build.
    pub built_at: Option<DateTime<Utc>>,
    /// Number of times the environment has been populated.
    pub builds: u64,
}

/// A physical directory tree ready for the execution engine.
///
/// One environment backs exactly one endpoint key. Its directory name is
/// derived from the key, so the location is stable while the key is.
pub struct Environment {
    id: String,
    endpoint_key: String,
    origin: PathBuf,
    root: PathBuf,
    script_relative: PathBuf,
    layout: Layout,
    pub(crate) state: Mutex<BuildState>,
}

impl Environment {
    pub(crate) fn new(
        id: String,
        endpoint_key: String,
        origin: PathBuf,
        root: PathBuf,
        script_relative: PathBuf,
        layout: Layout,
    ) -> Self {
        Self {
            id,
            endpoint_key,
            origin,
            root,
            script_relative,
            layout,
            state: Mutex::new(BuildState::default()),
        }
    }

    /// Stable id derived from the endpoint key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The endpoint key this environment serves.
    pub fn endpoint_key(&self) -> &str {
        &self.endpoint_key
    }

    /// Absolute path of the origin script.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Root directory of the environment.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Script path relative to [`root`](Self::root).
    pub fn script_relative(&self) -> &Path {
        &self.script_relative
    }

    /// Population layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Physical path of the script inside the environment.
    pub fn script_path(&self) -> PathBuf {
        self.root.join(&self.script_relative)
    }

    /// Document root handed to the execution engine: the script's directory.
    pub fn document_root(&self) -> PathBuf {
        let script = self.script_path();
        script.parent().map_or_else(|| self.root.clone(), Path::to_path_buf)
    }

    /// Script name handed to the execution engine: `/` + file name.
    pub fn script_name(&self) -> String {
        let name = self
            .script_relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("/{name}")
    }

    /// Current build state.
    pub fn info(&self) -> EnvironmentInfo {
        let state = self.state.lock();
        EnvironmentInfo {
            hash: state.hash.clone(),
            built_at: state.built_at,
            builds: state.builds,
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("endpoint_key", &self.endpoint_key)
            .field("root", &self.root)
            .field("script", &self.script_relative)
            .field("layout", &self.layout.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_location() {
        let env = Environment::new(
            "abc".into(),
            "/srv/app/api/users.php".into(),
            PathBuf::from("/srv/app/api/users.php"),
            PathBuf::from("/tmp/envs/env-abc"),
            PathBuf::from("api/users.php"),
            Layout::SourceTree {
                source_root: PathBuf::from("/srv/app"),
            },
        );
        assert_eq!(env.script_path(), PathBuf::from("/tmp/envs/env-abc/api/users.php"));
        assert_eq!(env.document_root(), PathBuf::from("/tmp/envs/env-abc/api"));
        assert_eq!(env.script_name(), "/users.php");
        assert_eq!(env.info().builds, 0);
        assert!(env.info().hash.is_none());
    }
}
