//! Virtual filesystem with source, embedded and virtual origins.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Virtual Path Resolution                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  "/api/users.php" ──► normalize_virtual()                    │
//! │                            │                                 │
//! │                            ├─► Source   ─► /srv/app/api/...  │
//! │                            │                                 │
//! │                            ├─► Embedded ─► <scratch>/api/... │
//! │                            │   (extracted once from Bundle)  │
//! │                            │                                 │
//! │                            └─► Virtual  ─► <scratch>/api/... │
//! │                                (mirror of in-memory bytes)   │
//! │                                                              │
//! │  physical path ──► EnvironmentCache::get_environment()       │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Change Detection
//!
//! In development mode a background thread re-hashes every backing file on a
//! fixed interval. Changed paths are recorded as invalidated and consumed by
//! [`VirtualFs::refresh_if_needed`], which makes the environment cache rebuild
//! the backing environment on its next access.

mod bundle;
mod fs;
mod glob;
mod watch;

pub use bundle::{Bundle, BundleEntry, DirBundle, MapBundle};
pub use fs::{FileEntry, Origin, VirtualFs};
