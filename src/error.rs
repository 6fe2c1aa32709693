//! Crate error type.

use std::path::{Path, PathBuf};

use http::StatusCode;
use thiserror::Error;

/// Shorthand result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error returned by render callbacks and executors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for registration, materialization and request handling.
///
/// Callers serving HTTP map errors to responses with [`Error::status_code`].
///
/// # Example
///
/// ```ignore
/// match handler.handle(request) {
///     Ok(response) => response,
///     Err(Error::ScriptMissing { script, .. }) => not_found(&script),
///     Err(e) => internal_error(e.status_code()),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// A real path or virtual path does not exist.
    #[error("not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A file was expected but a directory was given.
    #[error("is a directory: {}", path.display())]
    IsDirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A virtual path could not be normalized.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The raw path as supplied.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// File I/O error with the path it happened on.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from an embedded bundle failed.
    #[error("bundle error on {path}: {source}")]
    Bundle {
        /// Path inside the bundle.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A glob pattern could not be compiled.
    #[error("invalid pattern {pattern:?}: {message}")]
    Pattern {
        /// The pattern as supplied.
        pattern: String,
        /// Message from the glob compiler.
        message: String,
    },

    /// An environment could not be created or rebuilt.
    #[error("environment {key}: {message}")]
    Environment {
        /// Endpoint key of the environment.
        key: String,
        /// What went wrong.
        message: String,
    },

    /// The script is missing from its environment even after a rebuild.
    #[error("script {} missing from environment {key}", script.display())]
    ScriptMissing {
        /// Endpoint key of the environment.
        key: String,
        /// Expected physical script path.
        script: PathBuf,
    },

    /// The request carries no matched route.
    #[error("request has no matched route")]
    NoRoute,

    /// The request body could not be parsed.
    #[error("malformed request body: {0}")]
    Body(String),

    /// A render callback failed.
    #[error("render callback for {pattern} failed: {source}")]
    Render {
        /// Route pattern of the callback.
        pattern: String,
        /// The callback error.
        #[source]
        source: BoxError,
    },

    /// The execution engine failed.
    #[error("execution failed: {0}")]
    Execution(#[source] BoxError),
}

impl Error {
    /// Create an I/O error bound to a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::Io { path, source }
    }

    /// Create an environment error.
    pub fn environment(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Environment {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    /// Check if this error means something does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ScriptMissing { .. })
    }

    /// HTTP status the serving layer should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::ScriptMissing { .. } | Self::NoRoute => {
                StatusCode::NOT_FOUND
            }
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::Execution(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = Error::io("/missing.php", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Body("bad".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::environment("/a.php", "disk full").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let denied = Error::io("/a.php", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!denied.is_not_found());
    }

    #[test]
    fn test_display_includes_path() {
        let err = Error::IsDirectory {
            path: PathBuf::from("/srv/app"),
        };
        assert_eq!(err.to_string(), "is a directory: /srv/app");
    }
}
