//! Source dimension cache.
//!
//! Probing a source's intrinsic size means reading and parsing its header on
//! every request. [`MetadataCache`] memoizes the result under a key derived
//! from the source path *and* its modification time, so an edited source
//! simply misses (new key) and the stale entry ages out on its TTL. No
//! invalidation or locking is needed for correctness: the worst case is a
//! redundant probe.
//!
//! The trait is the integration seam for a host application's key-value
//! cache; [`MemoryMetadataCache`] is the in-process implementation, backed by
//! `moka` with per-entry expiry.

use crate::imaging::{Dimensions, ImageBackend};
use crate::source::SourceStore;
use moka::Expiry;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Cache group used for dimension entries.
pub const METADATA_GROUP: &str = "thumbnail_meta";

/// Key-value store with per-entry TTL and key groups.
pub trait MetadataCache: Send + Sync {
    fn get(&self, key: &str, group: &str) -> Option<Dimensions>;

    fn store(&self, key: &str, value: Dimensions, ttl: Duration, group: &str);
}

/// Cache key for a source at a given modification time.
pub fn metadata_key(source_slug: &str, modified: SystemTime) -> String {
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(source_slug.as_bytes());
    hasher.update(secs.to_string().as_bytes());
    format!("thumbnail:meta:{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: Dimensions,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process [`MetadataCache`] with bounded capacity.
pub struct MemoryMetadataCache {
    inner: moka::sync::Cache<String, Entry>,
}

impl MemoryMetadataCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = moka::sync::Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { inner }
    }

    fn group_key(key: &str, group: &str) -> String {
        format!("{group}:{key}")
    }
}

impl MetadataCache for MemoryMetadataCache {
    fn get(&self, key: &str, group: &str) -> Option<Dimensions> {
        self.inner
            .get(&Self::group_key(key, group))
            .map(|entry| entry.value)
    }

    fn store(&self, key: &str, value: Dimensions, ttl: Duration, group: &str) {
        self.inner
            .insert(Self::group_key(key, group), Entry { value, ttl });
    }
}

/// Intrinsic dimensions of a source, memoized through `cache`.
///
/// Only successful probes are cached; a zero-sized result counts as a
/// failure.
pub fn probe_dimensions(
    cache: &dyn MetadataCache,
    backend: &dyn ImageBackend,
    store: &dyn SourceStore,
    slug: &str,
    modified: SystemTime,
    ttl: Duration,
) -> Result<Dimensions, ProbeError> {
    let key = metadata_key(slug, modified);
    if let Some(dims) = cache.get(&key, METADATA_GROUP) {
        debug!(slug, "dimension cache hit");
        return Ok(dims);
    }

    let bytes = store.read(slug).map_err(ProbeError::Read)?;
    let dims = backend
        .identify(&bytes)
        .map_err(|e| ProbeError::Decode(e.to_string()))?;
    if dims.width == 0 || dims.height == 0 {
        return Err(ProbeError::Decode(format!(
            "zero-sized image {}x{}",
            dims.width, dims.height
        )));
    }
    cache.store(&key, dims, ttl, METADATA_GROUP);
    debug!(slug, width = dims.width, height = dims.height, "probed source dimensions");
    Ok(dims)
}

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("failed to read source: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to read image dimensions: {0}")]
    Decode(String),
}
