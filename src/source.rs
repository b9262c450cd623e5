//! Source image access.
//!
//! The thumbnail pipeline never touches source files directly; it goes
//! through [`SourceStore`], which is how a host application plugs in its own
//! media storage. [`LocalSource`] serves slugs from a directory on disk.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Extensions that get a modern-format sibling lookup.
const SIBLING_ELIGIBLE: &[&str] = &["jpg", "jpeg", "png"];

/// Read-only access to source images addressed by slug.
pub trait SourceStore: Send + Sync {
    fn exists(&self, slug: &str) -> bool;

    fn read(&self, slug: &str) -> io::Result<Vec<u8>>;

    fn modified(&self, slug: &str) -> io::Result<SystemTime>;

    /// Whether a `.webp` sibling of a jpg/jpeg/png slug exists.
    fn modern_sibling_exists(&self, slug: &str) -> bool {
        modern_sibling(slug).is_some_and(|sibling| self.exists(&sibling))
    }
}

/// Lowercased extension of a slug, if any.
pub fn extension(slug: &str) -> Option<String> {
    Path::new(slug)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// `a/b.jpg` → `a/b.webp` for jpg/jpeg/png slugs; `None` otherwise.
pub fn modern_sibling(slug: &str) -> Option<String> {
    let ext = extension(slug)?;
    if !SIBLING_ELIGIBLE.contains(&ext.as_str()) {
        return None;
    }
    let stem_len = slug.len() - ext.len();
    Some(format!("{}webp", &slug[..stem_len]))
}

/// Source images stored under a local directory.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem path for a slug. `None` if the slug tries to leave the root.
    pub fn path_for(&self, slug: &str) -> Option<PathBuf> {
        let relative = Path::new(slug.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe || relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn require_path(&self, slug: &str) -> io::Result<PathBuf> {
        self.path_for(slug).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("invalid slug: {slug}"))
        })
    }
}

impl SourceStore for LocalSource {
    fn exists(&self, slug: &str) -> bool {
        self.path_for(slug).is_some_and(|p| p.is_file())
    }

    fn read(&self, slug: &str) -> io::Result<Vec<u8>> {
        fs::read(self.require_path(slug)?)
    }

    fn modified(&self, slug: &str) -> io::Result<SystemTime> {
        fs::metadata(self.require_path(slug)?)?.modified()
    }
}
