//! Image processing: pure Rust decode and resize, libwebp for lossy WebP.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Thumbnail** | Lanczos3 cover-resize + center crop |
//! | **Encode** | `webp` (WebP), `image::codecs` (JPEG, PNG, GIF) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{
    RequestedSize, SizeLimits, calculate_fill_dimensions, center_crop_origin, resolve_dimensions,
};
pub use params::{OutputFormat, Quality, ThumbnailParams};
pub use rust_backend::RustBackend;
