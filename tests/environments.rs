//! Environment materialization through the VFS.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use php_vfs::prelude::*;
use php_vfs::{Layout, content_hash, endpoint_key};
use tempfile::TempDir;

struct Site {
    tmp: TempDir,
    app: PathBuf,
}

impl Site {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("app");
        fs::create_dir_all(app.join("inc")).unwrap();
        fs::write(app.join("index.php"), "<?php require 'inc/db.php';").unwrap();
        fs::write(app.join("inc/db.php"), "<?php // db").unwrap();
        Self { tmp, app }
    }

    fn config(&self, develop: bool) -> Config {
        Config::builder()
            .temp_root(self.tmp.path().join("scratch"))
            .source_root(&self.app)
            .develop(develop)
            .build()
    }
}

/// Replace `path` through a rename so readers never see a partial file.
///
/// The staging file lives in `staging`, outside the mirrored tree.
fn replace(staging: &Path, path: &Path, content: &str) {
    let tmp = staging.join("staged.php");
    fs::write(&tmp, content).unwrap();
    fs::rename(&tmp, path).unwrap();
}

#[test]
fn test_source_script_gets_mirrored_tree() {
    let site = Site::new();
    let config = site.config(false);
    let vfs = VirtualFs::new(&config).unwrap();
    let cache = EnvironmentCache::new(&config).unwrap().with_embedded_root(vfs.scratch_dir());
    cache.add_library_bytes("<?php // shared", "lib/shared.php").unwrap();

    vfs.add_source_directory(site.app.to_str().unwrap(), "/").unwrap();
    let env = vfs.environment_for("/index.php", &cache).unwrap();

    assert!(matches!(env.layout(), Layout::SourceTree { .. }));
    assert_eq!(fs::read(env.root().join("inc/db.php")).unwrap(), b"<?php // db");
    assert_eq!(fs::read(env.root().join("lib/shared.php")).unwrap(), b"<?php // shared");
    assert_eq!(env.script_name(), "/index.php");
    assert_eq!(env.document_root(), env.root());
}

#[test]
fn test_virtual_script_gets_single_file() {
    let site = Site::new();
    let config = site.config(false);
    let vfs = VirtualFs::new(&config).unwrap();
    let cache = EnvironmentCache::new(&config).unwrap().with_embedded_root(vfs.scratch_dir());

    vfs.create_virtual_file("/health/check.php", "<?php echo 'ok';").unwrap();
    let env = vfs.environment_for("/health/check.php", &cache).unwrap();

    assert_eq!(env.layout(), &Layout::Embedded);
    assert_eq!(fs::read(env.script_path()).unwrap(), b"<?php echo 'ok';");
    assert!(!env.root().join("index.php").exists());
}

#[test]
fn test_virtual_rewrite_rebuilds_environment() {
    let site = Site::new();
    let config = site.config(false);
    let vfs = VirtualFs::new(&config).unwrap();
    let cache = EnvironmentCache::new(&config).unwrap().with_embedded_root(vfs.scratch_dir());

    vfs.create_virtual_file("/page.php", "v1").unwrap();
    let env = vfs.environment_for("/page.php", &cache).unwrap();
    assert_eq!(env.info().builds, 1);

    vfs.environment_for("/page.php", &cache).unwrap();
    assert_eq!(env.info().builds, 1);

    vfs.create_virtual_file("/page.php", "v2").unwrap();
    let env = vfs.environment_for("/page.php", &cache).unwrap();
    assert_eq!(env.info().builds, 2);
    assert_eq!(fs::read(env.script_path()).unwrap(), b"v2");
}

#[test]
fn test_recreated_virtual_file_rebuilds_environment() {
    let site = Site::new();
    let config = site.config(false);
    let vfs = VirtualFs::new(&config).unwrap();
    let cache = EnvironmentCache::new(&config).unwrap().with_embedded_root(vfs.scratch_dir());

    vfs.create_virtual_file("/page.php", "v1").unwrap();
    let env = vfs.environment_for("/page.php", &cache).unwrap();
    assert_eq!(fs::read(env.script_path()).unwrap(), b"v1");

    vfs.delete_file("/page.php").unwrap();
    assert!(vfs.environment_for("/page.php", &cache).unwrap_err().is_not_found());

    vfs.create_virtual_file("/page.php", "v2").unwrap();
    let env = vfs.environment_for("/page.php", &cache).unwrap();
    assert_eq!(env.info().builds, 2);
    assert_eq!(fs::read(env.script_path()).unwrap(), b"v2");
    assert!(vfs.invalidated_paths().is_empty());
}

#[test]
fn test_move_onto_served_path_rebuilds_environment() {
    let site = Site::new();
    let config = site.config(false);
    let vfs = VirtualFs::new(&config).unwrap();
    let cache = EnvironmentCache::new(&config).unwrap().with_embedded_root(vfs.scratch_dir());

    vfs.create_virtual_file("/a.php", "old a").unwrap();
    vfs.create_virtual_file("/c.php", "new a").unwrap();
    let env = vfs.environment_for("/a.php", &cache).unwrap();
    assert_eq!(fs::read(env.script_path()).unwrap(), b"old a");

    vfs.move_file("/a.php", "/b.php").unwrap();
    vfs.move_file("/c.php", "/a.php").unwrap();

    let env = vfs.environment_for("/a.php", &cache).unwrap();
    assert_eq!(fs::read(env.script_path()).unwrap(), b"new a");
    let moved = vfs.environment_for("/b.php", &cache).unwrap();
    assert_eq!(fs::read(moved.script_path()).unwrap(), b"old a");
}

#[test]
fn test_copy_onto_deleted_path_rebuilds_environment() {
    let site = Site::new();
    let config = site.config(false);
    let vfs = VirtualFs::new(&config).unwrap();
    let cache = EnvironmentCache::new(&config).unwrap().with_embedded_root(vfs.scratch_dir());

    vfs.create_virtual_file("/a.php", "first").unwrap();
    vfs.create_virtual_file("/src.php", "second").unwrap();
    vfs.environment_for("/a.php", &cache).unwrap();

    vfs.delete_file("/a.php").unwrap();
    vfs.copy_file("/src.php", "/a.php").unwrap();

    let env = vfs.environment_for("/a.php", &cache).unwrap();
    assert_eq!(fs::read(env.script_path()).unwrap(), b"second");
}

#[test]
fn test_watch_tick_invalidates_environment() {
    let site = Site::new();
    let config = site.config(false);
    let vfs = VirtualFs::new(&config).unwrap();
    let cache = EnvironmentCache::new(&config).unwrap();

    vfs.add_source_file(site.app.join("index.php"), "/index.php").unwrap();
    let env = vfs.environment_for("/index.php", &cache).unwrap();

    replace(site.tmp.path(), &site.app.join("index.php"), "<?php echo 'edited';");
    assert_eq!(vfs.check_changes(), vec!["/index.php".to_string()]);
    assert!(vfs.is_dirty());

    let env2 = vfs.environment_for("/index.php", &cache).unwrap();
    assert!(Arc::ptr_eq(&env, &env2));
    assert_eq!(env.info().builds, 2);
    assert_eq!(fs::read(env.script_path()).unwrap(), b"<?php echo 'edited';");
    assert!(!vfs.is_dirty());
}

#[test]
fn test_concurrent_rebuilds_are_consistent() {
    let site = Site::new();
    let cache = Arc::new(EnvironmentCache::new(&site.config(true)).unwrap());
    let origin = php_vfs::path::normalize_path(&site.app.join("index.php"));
    let key = endpoint_key(&origin);
    let versions: Vec<String> = (0..8)
        .map(|i| format!("<?php echo {i}; // {}", "x".repeat(4096)))
        .collect();

    thread::scope(|scope| {
        let writer = scope.spawn(|| {
            for version in &versions {
                replace(site.tmp.path(), &origin, version);
            }
        });
        let readers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    for _ in 0..10 {
                        let env = cache.get_environment(&key, &origin).unwrap();
                        let seen = String::from_utf8(fs::read(env.script_path()).unwrap()).unwrap();
                        assert!(
                            seen == "<?php require 'inc/db.php';" || versions.contains(&seen),
                            "partial content observed"
                        );
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    });

    let env = cache.get_environment(&key, &origin).unwrap();
    let last = versions.last().unwrap();
    assert_eq!(fs::read_to_string(env.script_path()).unwrap(), *last);
    assert_eq!(env.info().hash, Some(content_hash(last.as_bytes())));
    assert_eq!(cache.len(), 1);
}
