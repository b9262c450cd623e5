//! Cache garbage collection.
//!
//! Two cleanups, both best-effort: IO failures are logged at `warn` and
//! skipped, never returned, so a failed cleanup cannot abort a request or the
//! upstream deletion of a source file.
//!
//! - [`purge_for_logical_file`]: every artifact of a slug, in every size
//!   bucket, in both the current layout and the legacy layout with an extra
//!   numeric mtime segment:
//!
//!   ```text
//!   <root>/300x200/news/photo-1a2b3c4d5e6f.webp              current
//!   <root>/300x200/1700000000/news/photo-1a2b3c4d5e6f.jpg    legacy
//!   ```
//!
//!   Directories left empty are pruned up to, but never including, the
//!   cache root.
//! - [`purge_stale_formats`]: older-format siblings of a WebP artifact in
//!   one bucket.

use crate::cache_key::{self, ArtifactName};
use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions superseded by WebP artifacts.
pub const LEGACY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

#[derive(Error, Debug)]
pub enum GcError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to list {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Delete every cached artifact of `slug`. Returns the number of files removed.
pub fn purge_for_logical_file(cache_root: &Path, slug: &str) -> usize {
    let Some(name) = ArtifactName::for_slug(slug) else {
        return 0;
    };
    if !cache_root.is_dir() {
        return 0;
    }

    let buckets = match list_subdirs(cache_root) {
        Ok(dirs) => dirs,
        Err(e) => {
            warn!(error = %e, "cache GC could not list size buckets");
            return 0;
        }
    };

    let deleted: usize = buckets
        .par_iter()
        .map(|bucket| purge_bucket(bucket, &name))
        .sum();

    info!(slug, deleted, "purged cached thumbnails");
    deleted
}

fn purge_bucket(bucket: &Path, name: &ArtifactName) -> usize {
    let mut targets = vec![name.dir_in(bucket)];
    match list_subdirs(bucket) {
        Ok(children) => targets.extend(
            children
                .iter()
                .filter(|dir| is_mtime_segment(dir))
                .map(|dir| name.dir_in(dir)),
        ),
        Err(e) => warn!(error = %e, "cache GC could not list bucket"),
    }

    let mut deleted = 0;
    for target in targets {
        if !target.is_dir() {
            continue;
        }
        match delete_matching(&target, &name.stem) {
            Ok(n) => deleted += n,
            Err(e) => warn!(error = %e, "cache GC failed to scan directory"),
        }
        prune_empty_dirs(&target, bucket);
    }
    deleted
}

/// Remove files named `{stem}.{ext}` in `dir`, leaving in-flight lock files.
fn delete_matching(dir: &Path, stem: &str) -> Result<usize, GcError> {
    let prefix = format!("{stem}.");
    let entries = fs::read_dir(dir).map_err(|source| GcError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut deleted = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let Some(ext) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        if ext.is_empty() || ext.contains('.') || !entry.path().is_file() {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "deleted artifact");
                deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to delete artifact"),
        }
    }
    Ok(deleted)
}

/// Remove `start` and its ancestors while empty, up to and including `stop`.
fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = Some(start);
    while let Some(dir) = current {
        if !dir.starts_with(stop) || !is_empty_dir(dir) {
            return;
        }
        if let Err(e) = fs::remove_dir(dir) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %dir.display(), error = %e, "failed to prune cache directory");
            }
            return;
        }
        if dir == stop {
            return;
        }
        current = dir.parent();
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none())
}

fn is_mtime_segment(dir: &Path) -> bool {
    dir.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>, GcError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| GcError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

/// Delete legacy-format artifacts for the same key as `current`.
///
/// Returns the number of files removed.
pub fn purge_stale_formats(
    cache_root: &Path,
    slug: &str,
    width: u32,
    height: u32,
    current: &Path,
) -> usize {
    let mut deleted = 0;
    for ext in LEGACY_EXTENSIONS {
        let Some(path) = cache_key::artifact_path(cache_root, slug, width, height, ext) else {
            continue;
        };
        if path == current {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted stale-format artifact");
                deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete stale-format artifact"),
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_key::artifact_path;
    use crate::lock;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"artifact").unwrap();
    }

    // =========================================================================
    // purge_for_logical_file
    // =========================================================================

    #[test]
    fn purge_removes_all_sizes_and_formats() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("resize");
        let slug = "storage/news/photo.jpg";
        for (w, h, ext) in [(300, 200, "webp"), (300, 200, "jpg"), (600, 400, "webp")] {
            touch(&artifact_path(&root, slug, w, h, ext).unwrap());
        }

        assert_eq!(purge_for_logical_file(&root, slug), 3);
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn purge_handles_mixed_layouts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("resize");
        let slug = "/storage/news/photo.jpg";
        let name = ArtifactName::for_slug(slug).unwrap();

        let current = artifact_path(&root, slug, 300, 200, "webp").unwrap();
        let legacy = root
            .join("300x200/1700000000/storage/news")
            .join(name.file_name("jpg"));
        let legacy_other_bucket = root
            .join("150x150/1699999999/storage/news")
            .join(name.file_name("png"));
        touch(&current);
        touch(&legacy);
        touch(&legacy_other_bucket);

        assert_eq!(purge_for_logical_file(&root, slug), 3);
        assert!(root.is_dir());
        assert!(!root.join("300x200").exists());
        assert!(!root.join("150x150").exists());
    }

    #[test]
    fn purge_leaves_other_files_and_their_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("resize");
        let target = artifact_path(&root, "news/a.jpg", 100, 100, "webp").unwrap();
        let other = artifact_path(&root, "news/b.jpg", 100, 100, "webp").unwrap();
        let same_stem = artifact_path(&root, "news/A.png", 100, 100, "webp").unwrap();
        touch(&target);
        touch(&other);
        touch(&same_stem);

        assert_eq!(purge_for_logical_file(&root, "news/a.jpg"), 1);
        assert!(!target.exists());
        assert!(other.exists());
        assert!(same_stem.exists());
    }

    #[test]
    fn purge_skips_lock_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("resize");
        let artifact = artifact_path(&root, "a.jpg", 10, 10, "webp").unwrap();
        touch(&artifact);
        touch(&lock::lock_path(&artifact));

        assert_eq!(purge_for_logical_file(&root, "a.jpg"), 1);
        assert!(lock::lock_path(&artifact).exists());
    }

    #[test]
    fn purge_missing_root_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(purge_for_logical_file(&tmp.path().join("nope"), "a.jpg"), 0);
    }

    #[test]
    fn purge_empty_slug_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(purge_for_logical_file(tmp.path(), ""), 0);
    }

    #[test]
    fn mtime_segment_detection() {
        assert!(is_mtime_segment(Path::new("/r/300x200/1700000000")));
        assert!(!is_mtime_segment(Path::new("/r/300x200/storage")));
        assert!(!is_mtime_segment(Path::new("/r/300x200/17a")));
    }

    // =========================================================================
    // purge_stale_formats
    // =========================================================================

    #[test]
    fn stale_formats_removed_current_kept() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let slug = "news/a.jpg";
        let current = artifact_path(root, slug, 300, 200, "webp").unwrap();
        touch(&current);
        for ext in LEGACY_EXTENSIONS {
            touch(&artifact_path(root, slug, 300, 200, ext).unwrap());
        }
        let other_size = artifact_path(root, slug, 600, 400, "jpg").unwrap();
        touch(&other_size);

        assert_eq!(purge_stale_formats(root, slug, 300, 200, &current), 4);
        assert!(current.exists());
        assert!(other_size.exists());
    }

    #[test]
    fn stale_formats_with_nothing_to_delete() {
        let tmp = TempDir::new().unwrap();
        let current = artifact_path(tmp.path(), "a.png", 1, 1, "webp").unwrap();
        assert_eq!(purge_stale_formats(tmp.path(), "a.png", 1, 1, &current), 0);
    }
}
