//! Path utilities.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// The virtual root. Never backed by a file.
pub const VIRTUAL_ROOT: &str = "/";

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Lexical cleanup if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            clean(path)
        } else {
            std::env::current_dir()
                .map_or_else(|_| path.to_path_buf(), |cwd| clean(&cwd.join(path)))
        }
    })
}

/// Lexically collapse `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Normalize a virtual path.
///
/// The result always has exactly one leading slash, no trailing slash, and no
/// `.`/`..` segments. `..` never climbs above the root.
///
/// ```
/// use php_vfs::path::normalize_virtual;
///
/// assert_eq!(normalize_virtual("api//../users.php").unwrap(), "/users.php");
/// assert_eq!(normalize_virtual("/").unwrap(), "/");
/// ```
pub fn normalize_virtual(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(Error::invalid_path(path, "empty path"));
    }
    if path.contains('\0') {
        return Err(Error::invalid_path(path, "contains NUL byte"));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

/// Join a virtual prefix and a relative path, then normalize.
pub fn join_virtual(prefix: &str, relative: &str) -> Result<String> {
    normalize_virtual(&format!("{prefix}/{relative}"))
}

/// Location of a normalized virtual path under a scratch root.
pub fn scratch_location(root: &Path, vpath: &str) -> PathBuf {
    root.join(vpath.trim_start_matches('/'))
}

/// Convert a relative file system path to forward-slash form.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_virtual() {
        assert_eq!(normalize_virtual("index.php").unwrap(), "/index.php");
        assert_eq!(normalize_virtual("//api/./users.get.php/").unwrap(), "/api/users.get.php");
        assert_eq!(normalize_virtual("/a/b/../../../etc/passwd").unwrap(), "/etc/passwd");
        assert_eq!(normalize_virtual("..").unwrap(), "/");
    }

    #[test]
    fn test_normalize_virtual_rejects() {
        assert!(normalize_virtual("").is_err());
        assert!(normalize_virtual("/a\0b").is_err());
    }

    #[test]
    fn test_join_virtual() {
        assert_eq!(join_virtual("/app", "api/users.php").unwrap(), "/app/api/users.php");
        assert_eq!(join_virtual("/", "index.php").unwrap(), "/index.php");
        assert_eq!(join_virtual("", "../x.php").unwrap(), "/x.php");
    }

    #[test]
    fn test_scratch_location_stays_under_root() {
        let root = Path::new("/tmp/scratch");
        assert_eq!(
            scratch_location(root, "/api/users.php"),
            PathBuf::from("/tmp/scratch/api/users.php")
        );
    }

    #[test]
    fn test_normalize_path_lexical_fallback() {
        let path = normalize_path(Path::new("/definitely/not/../here.php"));
        assert_eq!(path, PathBuf::from("/definitely/here.php"));
    }

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(Path::new("api/users.get.php")), "api/users.get.php");
    }
}
