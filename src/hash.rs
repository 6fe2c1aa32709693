//! Content hashing for change detection.
//!
//! Environments and virtual files are invalidated by content, not by mtime:
//! copies and mirrors rewrite timestamps, and some filesystems only keep
//! coarse ones.

use std::fmt;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of the environment id derived from an endpoint key.
const ENDPOINT_ID_LEN: usize = 16;

/// SHA-256 digest of a file's content, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a byte slice.
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    ContentHash(hex::encode(Sha256::digest(bytes)))
}

/// Hash the content of a file on disk.
pub fn hash_file(path: &Path) -> Result<ContentHash> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(content_hash(&bytes))
}

/// Deterministic directory id for an endpoint key.
///
/// Derived from the key, never from content, so an environment keeps its
/// location for as long as its key is stable.
pub fn endpoint_id(key: &str) -> String {
    let mut id = hex::encode(Sha256::digest(key.as_bytes()));
    id.truncate(ENDPOINT_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_known_value() {
        assert_eq!(
            content_hash(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.php");
        fs::write(&path, "<?php echo 1;").unwrap();
        assert_eq!(hash_file(&path).unwrap(), content_hash(b"<?php echo 1;"));
    }

    #[test]
    fn test_hash_file_missing() {
        let err = hash_file(Path::new("/nonexistent/index.php")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_endpoint_id_is_stable() {
        let a = endpoint_id("/srv/app/index.php");
        assert_eq!(a.len(), ENDPOINT_ID_LEN);
        assert_eq!(a, endpoint_id("/srv/app/index.php"));
        assert_ne!(a, endpoint_id("/srv/app/about.php"));
    }
}
