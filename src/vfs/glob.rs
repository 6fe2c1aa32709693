//! Source directory and glob expansion.

use std::fs;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path::to_slash;

/// A real file picked up by [`expand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceMatch {
    /// Real path of the file.
    pub real: PathBuf,
    /// Slash-separated path relative to the expansion base.
    pub relative: String,
}

/// Expand a directory path, a file path, or a glob into the files it covers.
///
/// - A file yields itself, relative to its parent.
/// - A directory is walked recursively, paths relative to the directory.
/// - A glob walks its literal prefix; matched files are taken as-is and
///   matched directories are walked, all relative to the literal prefix.
///
/// Unreadable entries are logged and skipped.
pub(crate) fn expand(pattern: &str) -> Result<Vec<SourceMatch>> {
    let mut matches = if has_glob_meta(pattern) {
        expand_glob(pattern)?
    } else {
        expand_literal(Path::new(pattern))?
    };
    matches.sort_by(|a, b| a.relative.cmp(&b.relative));
    matches.dedup_by(|a, b| a.relative == b.relative);
    Ok(matches)
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

fn expand_literal(path: &Path) -> Result<Vec<SourceMatch>> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if meta.is_dir() {
        let mut out = Vec::new();
        walk_files(path, path, &mut out);
        return Ok(out);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::invalid_path(path.to_string_lossy(), "no file name"))?;
    Ok(vec![SourceMatch {
        real: path.to_path_buf(),
        relative: name,
    }])
}

fn expand_glob(pattern: &str) -> Result<Vec<SourceMatch>> {
    let matcher = compile(pattern)?;
    let base = literal_base(pattern);
    if !base.exists() {
        return Err(Error::NotFound { path: base });
    }

    let mut out = Vec::new();
    let mut walker = WalkDir::new(&base).min_depth(1).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(base = %base.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !matcher.is_match(entry.path()) {
            continue;
        }
        if entry.file_type().is_dir() {
            walk_files(entry.path(), &base, &mut out);
            walker.skip_current_dir();
        } else if entry.file_type().is_file() {
            out.push(source_match(entry.path(), &base));
        }
    }
    Ok(out)
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// The leading components of `pattern` that contain no glob syntax.
fn literal_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        if let Component::Normal(part) = component
            && has_glob_meta(&part.to_string_lossy())
        {
            break;
        }
        base.push(component.as_os_str());
    }
    if base.as_os_str().is_empty() {
        base.push(".");
    }
    base
}

fn walk_files(dir: &Path, base: &Path, out: &mut Vec<SourceMatch>) {
    for entry in WalkDir::new(dir).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => out.push(source_match(entry.path(), base)),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
            }
        }
    }
}

fn source_match(path: &Path, base: &Path) -> SourceMatch {
    let relative = path.strip_prefix(base).unwrap_or(path);
    SourceMatch {
        real: path.to_path_buf(),
        relative: to_slash(relative),
    }
}
