//! Parameter types for image operations.
//!
//! These structs describe *what* to produce, not *how*. They are the interface
//! between the request pipeline (which decides size and format) and the
//! [`backend`](super::backend) (which does the pixel work), so a mock backend
//! can stand in during tests.
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`OutputFormat`]: Artifact encoding, mapped to file extension and MIME type.
//! - [`ThumbnailParams`]: Exact output dimensions, format and quality for one artifact.

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoding of a generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// The modern format every source is transcoded to by default.
    WebP,
    Jpeg,
    Png,
    Gif,
}

impl OutputFormat {
    /// Format family for a source extension, or `None` if it isn't an image we serve.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "webp" => Some(Self::WebP),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Extension written on cache artifacts.
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
        }
    }

    pub fn is_modern(self) -> bool {
        self == Self::WebP
    }
}

/// Parameters for a thumbnail operation (cover-resize + center crop + encode).
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailParams {
    /// Exact output dimensions.
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}
