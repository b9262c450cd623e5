//! Public image URLs.
//!
//! [`ImageUrlResolver`] turns a source path plus an optional size into the
//! URL a page should reference. Resolvers compose:
//!
//! - [`BaseUrlResolver`] prefixes a base URL and nothing else.
//! - [`ThumbnailUrlResolver`] wraps any resolver, turns a size into
//!   `w`/`h` query parameters, prefers a `.webp` sibling of jpg/jpeg/png
//!   sources, and routes sized URLs through the `resize/` endpoint.
//!
//! Whether a call is already inside a resize rewrite is passed down as a
//! [`ResolveContext`] argument, so stacked decorators never rewrite a path
//! twice and concurrent callers share no state.
//!
//! ```text
//! storage/news/a.jpg + "300x200" ─▶ /resize/storage/news/a.webp?w=300&h=200
//! storage/news/a.jpg + "300xauto" ─▶ /resize/storage/news/a.webp?w=300
//! storage/news/a.jpg + "autoxauto" ─▶ /storage/news/a.jpg
//! ```

use crate::source::{self, SourceStore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Path prefix of the resize endpoint.
pub const RESIZE_PREFIX: &str = "resize/";

/// Widths used by [`srcset`] when none are given.
pub const DEFAULT_SRCSET_WIDTHS: &[u32] = &[320, 480, 767, 960, 1280, 1800];

/// Call context threaded through nested resolvers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveContext {
    /// Set once a resolver has rewritten the path to the resize endpoint.
    pub in_resize: bool,
}

impl ResolveContext {
    pub fn within_resize(self) -> Self {
        Self { in_resize: true }
    }
}

pub trait ImageUrlResolver: Send + Sync {
    /// URL for `path` at `size` (`"WxH"` or a preset name). `None` for an
    /// empty path.
    fn image_url(&self, path: &str, size: Option<&str>, ctx: ResolveContext) -> Option<String>;
}

fn is_absolute_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Joins a base URL and the path. Absolute URLs pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct BaseUrlResolver {
    base_url: String,
}

impl BaseUrlResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ImageUrlResolver for BaseUrlResolver {
    fn image_url(&self, path: &str, _size: Option<&str>, _ctx: ResolveContext) -> Option<String> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        if is_absolute_url(path) {
            return Some(path.to_string());
        }
        Some(format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

/// A `WxH` size where either side may be `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl SizeSpec {
    /// Parse `"300x200"`, `"300xauto"`, `"autox200"` or `"autoxauto"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once('x')?;
        Some(Self {
            width: parse_side(w)?,
            height: parse_side(h)?,
        })
    }

    /// `w=..&h=..` for the non-auto sides; `None` when both are auto.
    pub fn query(&self) -> Option<String> {
        let parts: Vec<String> = [("w", self.width), ("h", self.height)]
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| format!("{key}={v}")))
            .collect();
        (!parts.is_empty()).then(|| parts.join("&"))
    }
}

/// `Some(None)` for `auto`, `Some(Some(n))` for a positive integer.
fn parse_side(s: &str) -> Option<Option<u32>> {
    match s.trim() {
        "auto" => Some(None),
        n => n.parse::<u32>().ok().filter(|&v| v > 0).map(Some),
    }
}

/// Decorator adding thumbnail sizing to another resolver.
pub struct ThumbnailUrlResolver<R> {
    inner: R,
    store: Arc<dyn SourceStore>,
    presets: BTreeMap<String, String>,
}

impl<R: ImageUrlResolver> ThumbnailUrlResolver<R> {
    pub fn new(inner: R, store: Arc<dyn SourceStore>, presets: BTreeMap<String, String>) -> Self {
        Self {
            inner,
            store,
            presets,
        }
    }

    fn size_spec(&self, size: &str) -> Option<SizeSpec> {
        let literal = self.presets.get(size).map(String::as_str).unwrap_or(size);
        SizeSpec::parse(literal)
    }

    fn prefer_modern<'a>(&self, path: &'a str) -> std::borrow::Cow<'a, str> {
        let slug = path.trim_start_matches('/');
        match source::modern_sibling(slug) {
            Some(sibling) if self.store.modern_sibling_exists(slug) => {
                let leading = &path[..path.len() - slug.len()];
                format!("{leading}{sibling}").into()
            }
            _ => path.into(),
        }
    }
}

impl<R: ImageUrlResolver> ImageUrlResolver for ThumbnailUrlResolver<R> {
    fn image_url(&self, path: &str, size: Option<&str>, ctx: ResolveContext) -> Option<String> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        let size = size.map(str::trim).filter(|s| !s.is_empty());
        let Some(size) = size else {
            return self.inner.image_url(path, None, ctx);
        };
        if is_absolute_url(path) {
            return self.inner.image_url(path, None, ctx);
        }

        let (pure, existing_query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let pure = self.prefer_modern(pure);

        let query = self
            .size_spec(size)
            .and_then(|spec| spec.query())
            .or_else(|| existing_query.map(str::to_string));
        let Some(query) = query else {
            return self.inner.image_url(&pure, None, ctx);
        };

        let already_resized =
            ctx.in_resize || pure.trim_start_matches('/').starts_with(RESIZE_PREFIX);
        let target = if already_resized {
            format!("{pure}?{query}")
        } else {
            format!("{RESIZE_PREFIX}{}?{query}", pure.trim_start_matches('/'))
        };
        self.inner.image_url(&target, None, ctx.within_resize())
    }
}

/// `"<url> 320w, <url> 480w, ..."` for `path` at each width.
pub fn srcset(resolver: &dyn ImageUrlResolver, path: &str, widths: &[u32]) -> String {
    widths
        .iter()
        .filter_map(|w| {
            resolver
                .image_url(path, Some(&format!("{w}xauto")), ResolveContext::default())
                .map(|url| format!("{url} {w}w"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
