//! The resize request pipeline.
//!
//! ```text
//! request ─▶ resolve source ─▶ probe dimensions (memoized) ─▶ resolve size
//!         ─▶ artifact path ─▶ fresh? ─yes─▶ serve
//!                               │no
//!                               ▼
//!                 lock ─▶ fresh now? ─no─▶ decode/resize/encode ─▶ atomic write
//!                               │yes                                  │
//!                               └──────────────▶ unlock ◀─────────────┘ ─▶ serve
//! ```
//!
//! An artifact is fresh when its mtime is not older than the source's. A
//! stale artifact keeps being served to concurrent readers until the
//! regenerated file is renamed over it; readers never observe a partial
//! file because every write goes through a temp file in the same directory.
//!
//! [`ThumbnailService::ensure`] is blocking (filesystem, codec and lock
//! polling); the HTTP layer runs it on the blocking pool.

use crate::cache_key;
use crate::config::ServiceConfig;
use crate::gc;
use crate::imaging::{
    BackendError, ImageBackend, OutputFormat, Quality, RequestedSize, RustBackend, SizeLimits,
    ThumbnailParams, resolve_dimensions,
};
use crate::lock::{self, LockError, LockOptions};
use crate::metadata::{self, MemoryMetadataCache, MetadataCache};
use crate::resolve::{ResolvedSource, resolve_source};
use crate::source::{LocalSource, SourceStore};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Source image not found: {0}")]
    SourceNotFound(String),
    #[error("Unreadable image {slug}: {reason}")]
    DimensionProbeFailed { slug: String, reason: String },
    #[error("Timed out after {waited:?} waiting for generation lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },
    #[error("Encoding failed for {slug}: {reason}")]
    EncodeFailure { slug: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SourceNotFound(_) | Self::DimensionProbeFailed { .. } => 404,
            Self::LockTimeout { .. } | Self::EncodeFailure { .. } | Self::Io(_) => 500,
        }
    }
}

impl From<LockError> for ServiceError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout { path, waited } => Self::LockTimeout { path, waited },
            LockError::Io { source, .. } => Self::Io(source),
        }
    }
}

/// A resize request. Absent or blank `w`/`h` are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub slug: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ThumbnailRequest {
    pub fn new(slug: impl Into<String>, width: Option<f64>, height: Option<f64>) -> Self {
        Self {
            slug: slug.into(),
            width,
            height,
        }
    }
}

/// A materialized artifact, ready to serve.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub modified: SystemTime,
    pub size: u64,
    pub etag: String,
    /// True when this call produced the file.
    pub generated: bool,
}

/// Pipeline settings, derived from [`ServiceConfig`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub cache_root: PathBuf,
    pub default_image: Option<String>,
    pub limits: SizeLimits,
    pub force_modern: bool,
    pub modern_quality: Quality,
    pub original_quality: Quality,
    pub lock: LockOptions,
    pub metadata_ttl: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            cache_root: config.cache_root(),
            default_image: config.default_image.clone(),
            limits: SizeLimits {
                max_auto_width: config.resize.max_auto_width,
                max_dimension: config.resize.max_dimension,
            },
            force_modern: config.resize.force_modern_format,
            modern_quality: Quality::new(config.resize.modern_quality),
            original_quality: Quality::new(config.resize.original_quality),
            lock: LockOptions {
                timeout: config.lock.timeout(),
                poll_interval: config.lock.poll_interval(),
            },
            metadata_ttl: config.metadata.ttl(),
        }
    }

    fn quality(&self) -> Quality {
        if self.force_modern {
            self.modern_quality
        } else {
            self.original_quality
        }
    }
}

pub struct ThumbnailService {
    settings: ServiceSettings,
    store: Arc<dyn SourceStore>,
    metadata: Arc<dyn MetadataCache>,
    backend: Arc<dyn ImageBackend>,
}

impl ThumbnailService {
    pub fn new(
        settings: ServiceSettings,
        store: Arc<dyn SourceStore>,
        metadata: Arc<dyn MetadataCache>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            settings,
            store,
            metadata,
            backend,
        }
    }

    /// Local sources under `public_root`, in-memory metadata cache, Rust codecs.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            ServiceSettings::from_config(config),
            Arc::new(LocalSource::new(&config.public_root)),
            Arc::new(MemoryMetadataCache::new(config.metadata.max_entries)),
            Arc::new(RustBackend::new()),
        )
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn SourceStore> {
        Arc::clone(&self.store)
    }

    /// Return a fresh artifact for `request`, generating it if needed.
    pub fn ensure(&self, request: &ThumbnailRequest) -> Result<Artifact, ServiceError> {
        let slug = cache_key::normalize_slug(&request.slug);
        if cache_key::ArtifactName::for_slug(slug).is_none() {
            return Err(ServiceError::SourceNotFound(request.slug.clone()));
        }

        let source = resolve_source(
            self.store.as_ref(),
            slug,
            self.settings.default_image.as_deref(),
            self.settings.force_modern,
        )
        .ok_or_else(|| ServiceError::SourceNotFound(slug.to_string()))?;

        let intrinsic = metadata::probe_dimensions(
            self.metadata.as_ref(),
            self.backend.as_ref(),
            self.store.as_ref(),
            &source.slug,
            source.modified,
            self.settings.metadata_ttl,
        )
        .map_err(|e| ServiceError::DimensionProbeFailed {
            slug: source.slug.clone(),
            reason: e.to_string(),
        })?;

        let (width, height) = resolve_dimensions(
            RequestedSize::new(request.width, request.height),
            (intrinsic.width, intrinsic.height),
            self.settings.limits,
        );

        let path = cache_key::artifact_path(
            &self.settings.cache_root,
            slug,
            width,
            height,
            source.output.extension(),
        )
        .ok_or_else(|| ServiceError::SourceNotFound(slug.to_string()))?;

        if is_fresh(&path, source.modified)? {
            debug!(
                path = %path.display(),
                default_image = source.is_default,
                "thumbnail cache hit"
            );
            return describe(&path, source.output, false);
        }

        if source.output.is_modern() {
            gc::purge_stale_formats(&self.settings.cache_root, slug, width, height, &path);
        }

        let handle = lock::acquire(&path, &self.settings.lock)?;
        // Another worker may have produced it while we waited
        let generated = if is_fresh(&path, source.modified)? {
            false
        } else {
            self.generate(&source, &path, width, height)?;
            true
        };
        handle.release();

        describe(&path, source.output, generated)
    }

    fn generate(
        &self,
        source: &ResolvedSource,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), ServiceError> {
        let start = Instant::now();
        let bytes = self.store.read(&source.slug).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ServiceError::SourceNotFound(source.slug.clone()),
            _ => ServiceError::Io(e),
        })?;

        let params = ThumbnailParams {
            width,
            height,
            format: source.output,
            quality: self.settings.quality(),
        };
        let encoded = self
            .backend
            .thumbnail(&bytes, &params)
            .map_err(|e| match e {
                BackendError::Decode(reason) => ServiceError::DimensionProbeFailed {
                    slug: source.slug.clone(),
                    reason,
                },
                BackendError::Encode(reason) => ServiceError::EncodeFailure {
                    slug: source.slug.clone(),
                    reason,
                },
                BackendError::Io(e) => ServiceError::Io(e),
            })?;

        write_atomic(path, &encoded, source.modified)?;
        info!(
            source = %source.slug,
            default_image = source.is_default,
            path = %path.display(),
            width,
            height,
            bytes = encoded.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generated thumbnail"
        );
        Ok(())
    }

    /// Delete every artifact of `slug`. Returns the number of files removed.
    pub fn purge(&self, slug: &str) -> usize {
        gc::purge_for_logical_file(&self.settings.cache_root, slug)
    }
}

fn is_fresh(path: &Path, source_modified: SystemTime) -> Result<bool, ServiceError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(source_modified <= meta.modified()?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn describe(path: &Path, fallback: OutputFormat, generated: bool) -> Result<Artifact, ServiceError> {
    let meta = fs::metadata(path)?;
    let modified = meta.modified()?;
    let format = path
        .extension()
        .and_then(|e| OutputFormat::from_extension(&e.to_string_lossy()))
        .unwrap_or(fallback);
    Ok(Artifact {
        path: path.to_path_buf(),
        format,
        modified,
        size: meta.len(),
        etag: cache_key::etag(path, modified, meta.len()),
        generated,
    })
}

/// Write through a temp file in the target directory, then rename into place.
///
/// The artifact's mtime is never earlier than `not_before`, so a source
/// stamped in the future (clock skew) still yields a fresh artifact.
fn write_atomic(path: &Path, bytes: &[u8], not_before: SystemTime) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    if not_before > SystemTime::now() {
        tmp.as_file().set_modified(not_before)?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
