//! Shared test utilities for the thumbcache test suite.
//!
//! Provides synthetic source images (generated in memory, no binary
//! fixtures), a temp public root to write them into, and mtime helpers for
//! freshness tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let root = PublicRoot::new();
//! root.write("news/photo.jpg", &jpeg_bytes(1200, 800));
//! set_mtime(&root.path().join("news/photo.jpg"), past(3600));
//! ```

use std::fs::{self, OpenOptions};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Encoded JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// Encoded PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

// =========================================================================
// Public root fixture
// =========================================================================

/// Temp directory standing in for the public root. Deleted on drop.
pub struct PublicRoot {
    dir: TempDir,
}

impl PublicRoot {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Cache root under the public root, as in the default config.
    pub fn cache_root(&self) -> PathBuf {
        self.dir.path().join("resize")
    }

    /// Write `bytes` at `slug`, creating parent directories.
    pub fn write(&self, slug: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(slug);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }
}

// =========================================================================
// Timestamps
// =========================================================================

/// `secs` seconds before now.
pub fn past(secs: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(secs)
}

/// Set a file's modification time.
pub fn set_mtime(path: &Path, time: SystemTime) {
    OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}
