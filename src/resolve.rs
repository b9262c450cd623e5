//! Source resolution for a resize request.
//!
//! Decides which file actually gets read and what the artifact is encoded
//! as:
//!
//! 1. the requested slug if it exists, else the configured default image
//! 2. output format: WebP when transcoding is forced, otherwise the source's
//!    own format family
//! 3. for a WebP output from a jpg/jpeg/png source, a `.webp` sibling is
//!    read instead when one exists
//!
//! The sibling is never used for a non-WebP output; decoding a lossy WebP
//! to re-encode as PNG would silently lose information.

use crate::imaging::OutputFormat;
use crate::source::{self, SourceStore};
use std::time::SystemTime;
use tracing::debug;

/// The source file a request will be served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Slug of the file that is read (may be the default image or a sibling).
    pub slug: String,
    pub modified: SystemTime,
    pub output: OutputFormat,
    /// True when the requested slug was missing and the default image stands in.
    pub is_default: bool,
}

/// Resolve `requested` to a readable source. `None` means not found.
pub fn resolve_source(
    store: &dyn SourceStore,
    requested: &str,
    default_image: Option<&str>,
    force_modern: bool,
) -> Option<ResolvedSource> {
    let requested = requested.trim_start_matches('/');
    let (original, is_default) = if store.exists(requested) {
        (requested.to_string(), false)
    } else {
        let fallback = default_image
            .map(|d| d.trim_start_matches('/'))
            .filter(|d| store.exists(d))?;
        debug!(requested, fallback, "source missing, using default image");
        (fallback.to_string(), true)
    };

    let original_format = OutputFormat::from_extension(&source::extension(&original)?)?;
    let output = if force_modern {
        OutputFormat::WebP
    } else {
        original_format
    };

    let slug = match source::modern_sibling(&original) {
        Some(sibling) if output.is_modern() && store.exists(&sibling) => sibling,
        _ => original,
    };
    let modified = store.modified(&slug).ok()?;

    Some(ResolvedSource {
        slug,
        modified,
        output,
        is_default,
    })
}
