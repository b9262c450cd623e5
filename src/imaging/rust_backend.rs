//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image` crate (pure Rust decoders) |
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Center crop | `image::DynamicImage::crop_imm` |
//! | Encode → WebP | `webp` crate (lossy, quality-controlled) |
//! | Encode → JPEG / PNG / GIF | `image::codecs` encoders |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{calculate_fill_dimensions, center_crop_origin};
use super::params::{OutputFormat, ThumbnailParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(source: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(source).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Cover-resize then center-crop to exactly `target`.
fn cover_crop(img: &DynamicImage, target: (u32, u32)) -> DynamicImage {
    let filled = calculate_fill_dimensions((img.width(), img.height()), target);
    let resized = img.resize_exact(filled.0, filled.1, FilterType::Lanczos3);
    let (x, y) = center_crop_origin(filled, target);
    resized.crop_imm(x, y, target.0, target.1)
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let result = match format {
        OutputFormat::WebP => {
            // libwebp wants RGB8/RGBA8; normalise whatever the decoder produced
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let encoder = webp::Encoder::from_image(&rgba)
                .map_err(|e| BackendError::Encode(format!("WebP: {e}")))?;
            return Ok(encoder.encode(quality as f32).to_vec());
        }
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality as u8);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => img.write_with_encoder(PngEncoder::new(&mut buf)),
        OutputFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif),
    };
    result.map_err(|e| BackendError::Encode(format!("{}: {e}", format.extension())))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::new(Cursor::new(source))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {e}")))?;
        Ok(Dimensions { width, height })
    }

    fn thumbnail(
        &self,
        source: &[u8],
        params: &ThumbnailParams,
    ) -> Result<Vec<u8>, BackendError> {
        let img = decode(source)?;
        let cropped = cover_crop(&img, (params.width, params.height));
        encode(&cropped, params.format, params.quality.value())
    }
}
