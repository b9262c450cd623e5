//! Deterministic artifact paths.
//!
//! Every thumbnail lives at
//!
//! ```text
//! <cache_root>/{w}x{h}/{slug dir}/{slugified stem}-{hash12}.{ext}
//! ```
//!
//! where `hash12` is the first 12 hex characters of the SHA-256 of the full
//! (leading-slash-trimmed) slug. The source modification time is deliberately
//! absent: a changed source regenerates the *same* path, and freshness is
//! judged by comparing file timestamps at request time. The hash keeps two
//! slugs apart when their file names slugify to the same stem
//! (`a/Photo 1.jpg` vs `a/photo-1.png`).
//!
//! [`ArtifactName`] is shared with [`gc`](crate::gc), which has to rebuild the
//! same `{stem}-{hash12}` pattern to find every artifact of a logical file.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hex characters of the slug hash kept in file names.
pub const SLUG_HASH_LEN: usize = 12;

/// Stem used when a file name slugifies to nothing (e.g. `"...jpg"`).
const FALLBACK_STEM: &str = "thumbnail";

/// Strip leading slashes so `/a/b.jpg` and `a/b.jpg` share artifacts.
pub fn normalize_slug(slug: &str) -> &str {
    slug.trim_start_matches('/')
}

/// Lowercase ASCII slug: alphanumeric runs joined by single dashes.
///
/// ```
/// # use thumbcache::cache_key::slugify;
/// assert_eq!(slugify("My Photo (Final)"), "my-photo-final");
/// assert_eq!(slugify("__"), "");
/// ```
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// First [`SLUG_HASH_LEN`] hex characters of SHA-256 over the normalized slug.
pub fn slug_hash(slug: &str) -> String {
    let digest = Sha256::digest(normalize_slug(slug).as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(SLUG_HASH_LEN);
    hex
}

/// The size-independent part of an artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    /// Directory part of the slug, if any (`storage/news` for `storage/news/a.jpg`).
    pub subdir: Option<PathBuf>,
    /// `{slugified stem}-{hash12}`, without extension.
    pub stem: String,
}

impl ArtifactName {
    /// Derive the name for a slug. `None` for an empty slug or one that
    /// would escape the cache root (`..`, drive prefixes).
    pub fn for_slug(slug: &str) -> Option<Self> {
        let slug = normalize_slug(slug);
        if slug.is_empty() {
            return None;
        }
        let path = Path::new(slug);
        if !path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let file_stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut normalized = slugify(&file_stem);
        if normalized.is_empty() {
            normalized = FALLBACK_STEM.to_string();
        }
        let subdir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        Some(Self {
            subdir,
            stem: format!("{}-{}", normalized, slug_hash(slug)),
        })
    }

    /// File name of the artifact for `extension`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.stem, extension)
    }

    /// Directory holding this name's artifacts inside `bucket_dir`.
    pub fn dir_in(&self, bucket_dir: &Path) -> PathBuf {
        match &self.subdir {
            Some(sub) => bucket_dir.join(sub),
            None => bucket_dir.to_path_buf(),
        }
    }
}

/// Name of the size bucket directory for a resolved output size.
pub fn bucket_name(width: u32, height: u32) -> String {
    format!("{}x{}", width, height)
}

/// Full artifact path for `(slug, width, height, extension)`.
///
/// Returns `None` for slugs [`ArtifactName::for_slug`] rejects.
pub fn artifact_path(
    cache_root: &Path,
    slug: &str,
    width: u32,
    height: u32,
    extension: &str,
) -> Option<PathBuf> {
    let name = ArtifactName::for_slug(slug)?;
    let bucket = cache_root.join(bucket_name(width, height));
    Some(name.dir_in(&bucket).join(name.file_name(extension)))
}

/// Strong validator for a served artifact: SHA-256 of path, mtime and size.
///
/// Cheap to compute (no content read) and changes whenever the artifact is
/// regenerated.
pub fn etag(path: &Path, modified: SystemTime, size: u64) -> String {
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(secs.to_string().as_bytes());
    hasher.update(size.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
