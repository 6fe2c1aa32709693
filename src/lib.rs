//! # php-vfs
//!
//! Per-request PHP execution environments on top of a layered virtual
//! filesystem.
//!
//! A serving process registers scripts from three origins, materializes one
//! physical directory per endpoint, and hands each request to an external
//! execution engine together with a flat map of environment variables:
//!
//! - **Virtual filesystem**: real source files, embedded bundle resources and
//!   in-memory files under one virtual namespace, last registration wins
//! - **Environment cache**: one directory per endpoint, rebuilt only when the
//!   origin's content hash changes
//! - **Global libraries**: files overlaid into every environment
//! - **Request translation**: path, params, query, form, JSON body, headers
//!   and render data as prefixed string variables
//!
//! ## Quick Start
//!
//! ```ignore
//! use php_vfs::prelude::*;
//!
//! let config = Config::from_env();
//! let handler = ScriptHandler::from_config(&config, engine)?;
//!
//! handler.vfs().add_source_directory("./app/**/*.php", "/")?;
//! handler.cache().add_library_bytes(INIT_PHP, "lib/init.php")?;
//!
//! // In the router, once a route matched:
//! MatchedRoute::new("GET /users/{id}", "/api/users.get.php").attach(&mut request);
//! let response = handler.handle_or_status(request);
//! ```
//!
//! ## Modules
//!
//! - [`vfs`]: Virtual filesystem and embedded bundles
//! - [`env`]: Environment cache and global libraries
//! - [`request`]: Route parameters and variable translation
//! - [`serve`]: Execution boundary and request handler
//! - [`config`]: Runtime configuration
//! - [`hash`]: Content hashing
//! - [`path`]: Virtual path normalization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod hash;
pub mod path;
pub mod request;
pub mod serve;
pub mod vfs;

mod fsutil;

// =============================================================================
// Prelude - import commonly used items with a single `use`
// =============================================================================

/// Prelude module for convenient imports.
///
/// ```ignore
/// use php_vfs::prelude::*;
/// ```
pub mod prelude {
    // Configuration and errors
    pub use crate::{Config, ConfigBuilder, Error, Result};

    // Filesystem
    pub use crate::{Bundle, DirBundle, MapBundle, Origin, VirtualFs};

    // Environments
    pub use crate::{Environment, EnvironmentCache};

    // Requests
    pub use crate::{EnvVars, MatchedRoute, RenderContext, RenderRegistry, Translator};

    // Serving
    pub use crate::{ExecRequest, Executor, ScriptHandler};
}

// =============================================================================
// Infrastructure
// =============================================================================

pub use config::{Config, ConfigBuilder};
pub use error::{BoxError, Error, Result};
pub use hash::{ContentHash, content_hash, hash_file};

// =============================================================================
// Filesystem & Environments
// =============================================================================

pub use env::{Environment, EnvironmentCache, EnvironmentInfo, Layout, Library, endpoint_key};
pub use vfs::{Bundle, BundleEntry, DirBundle, FileEntry, MapBundle, Origin, VirtualFs};

// =============================================================================
// Requests & Serving
// =============================================================================

pub use request::{EnvVars, MatchedRoute, RenderContext, RenderFn, RenderRegistry, Translator};
pub use serve::{ExecRequest, Executor, ScriptHandler};
