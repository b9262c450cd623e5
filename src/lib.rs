//! # thumbcache
//!
//! On-demand image thumbnails backed by a disk cache. A request names a
//! source image (a *slug*, relative to a public root) and optional target
//! dimensions; the first request for a given size produces the artifact, every
//! later one is served straight from disk with long-lived HTTP caching.
//!
//! # Request Pipeline
//!
//! ```text
//! GET /resize/news/photo.jpg?w=300
//!   │
//!   ├─ resolve    news/photo.jpg exists? else default image; .webp sibling?
//!   ├─ metadata   intrinsic size, memoized by (path, mtime)
//!   ├─ size       300 × (H·300/W), rounded, ≥ 1
//!   ├─ cache_key  resize/300x200/news/photo-1a2b3c4d5e6f.webp
//!   ├─ fresh?     artifact mtime ≥ source mtime → serve
//!   └─ lock       <artifact>.lock, re-check, generate, atomic rename, unlock
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `thumbcache.toml` loading, merging over stock defaults, validation |
//! | [`source`] | [`SourceStore`](source::SourceStore) seam for source bytes; local-directory implementation |
//! | [`resolve`] | Picks the file actually read (default image, `.webp` sibling) and the output format |
//! | [`metadata`] | TTL cache of source dimensions keyed by path + mtime |
//! | [`imaging`] | Dimension math and the codec backend: cover-resize, center crop, encode |
//! | [`cache_key`] | Deterministic artifact paths and ETags |
//! | [`lock`] | Cross-process per-artifact generation lock with bounded wait |
//! | [`gc`] | Purging a slug's artifacts; stale-format cleanup |
//! | [`service`] | The pipeline above, tying the modules together |
//! | [`http`] | axum router, conditional responses, error → status mapping |
//! | [`url`] | Public image URLs, resize rewriting, `srcset` |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## No Modification Time in Artifact Paths
//!
//! The artifact path depends only on slug, size and format. An edited source
//! regenerates the *same* file instead of leaving the old one orphaned under a
//! different path, and purging a slug never has to guess which timestamps
//! exist. Freshness is a timestamp comparison at request time.
//!
//! ## File Locks, Not Mutexes
//!
//! Workers serving the same cache may live in different processes, so the
//! only shared coordination point assumed is the filesystem. See [`lock`].
//!
//! ## Atomic Writes
//!
//! Artifacts are written to a temp file in their final directory and renamed
//! into place. Readers see either the previous artifact or the complete new
//! one, never a truncated file, and a failed encode leaves nothing behind.

pub mod cache_key;
pub mod config;
pub mod gc;
pub mod http;
pub mod imaging;
pub mod lock;
pub mod logging;
pub mod metadata;
pub mod output;
pub mod resolve;
pub mod service;
pub mod source;
pub mod url;

#[cfg(test)]
pub(crate) mod test_helpers;
