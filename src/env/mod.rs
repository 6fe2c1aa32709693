//! Materialized execution environments.
//!
//! Every endpoint gets its own physical directory the execution engine can
//! run in. Environments are created on first use and rebuilt when the origin
//! script's content hash changes or when they are explicitly invalidated.
//!
//! ```text
//! origin script ──► classify ──┬─► SourceTree: mirror source root
//!                              ├─► Embedded:   copy the script
//!                              └─► Detached:   copy the script (warned)
//!                                        │
//!                                        ▼
//!                              overlay global libraries
//! ```

mod cache;
mod environment;
mod library;
mod populate;

pub use cache::{EnvironmentCache, endpoint_key};
pub use environment::{Environment, EnvironmentInfo, Layout};
pub use library::{Library, LibrarySource};
