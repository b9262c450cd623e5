//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Requested output size. Either side may be left for the source's aspect
/// ratio to decide.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestedSize {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl RequestedSize {
    pub fn new(width: Option<f64>, height: Option<f64>) -> Self {
        Self { width, height }
    }
}

/// Upper bounds applied while resolving a thumbnail size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// Cap on the source width whenever the width is not requested.
    pub max_auto_width: u32,
    /// Hard cap on either output side.
    pub max_dimension: u32,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_auto_width: 1920,
            max_dimension: 4096,
        }
    }
}

/// Resolve the final pixel dimensions of a thumbnail.
///
/// - width not given: the source width is capped at `max_auto_width`; a
///   given height then scales that capped width by `h / H`
/// - height not given: height follows the source aspect ratio
/// - both given: used as-is (the engine crops to fill)
///
/// Results are rounded to the nearest integer and clamped to
/// `1..=max_dimension` per side.
///
/// # Examples
/// ```
/// # use thumbcache::imaging::{RequestedSize, SizeLimits, resolve_dimensions};
/// let limits = SizeLimits::default();
/// assert_eq!(resolve_dimensions(RequestedSize::new(Some(600.0), None), (1200, 800), limits), (600, 400));
/// assert_eq!(resolve_dimensions(RequestedSize::default(), (3000, 2000), limits), (1920, 1280));
/// ```
pub fn resolve_dimensions(
    requested: RequestedSize,
    source: (u32, u32),
    limits: SizeLimits,
) -> (u32, u32) {
    let src_w = source.0.max(1) as f64;
    let src_h = source.1.max(1) as f64;

    let (w, h) = match (requested.width, requested.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, src_h * w / src_w),
        (None, height) => {
            let capped = src_w.min(limits.max_auto_width as f64);
            match height {
                Some(h) => (capped * h / src_h, h),
                None => (capped, src_h * capped / src_w),
            }
        }
    };

    let max = limits.max_dimension.max(1);
    (to_pixels(w, max), to_pixels(h, max))
}

fn to_pixels(value: f64, max: u32) -> u32 {
    if !value.is_finite() {
        return 1;
    }
    value.round().clamp(1.0, max as f64) as u32
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1), source.1.max(1));
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(tgt_h))
    }
}

/// Top-left corner of a `target`-sized window centered inside `filled`.
///
/// Overflow is split evenly; an odd pixel goes to the right/bottom edge.
pub fn center_crop_origin(filled: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    (
        filled.0.saturating_sub(target.0) / 2,
        filled.1.saturating_sub(target.1) / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SizeLimits {
        SizeLimits::default()
    }

    // =========================================================================
    // resolve_dimensions tests
    // =========================================================================

    #[test]
    fn width_only_derives_height() {
        let size = RequestedSize::new(Some(600.0), None);
        assert_eq!(resolve_dimensions(size, (1200, 800), limits()), (600, 400));
    }

    #[test]
    fn height_only_derives_width() {
        let size = RequestedSize::new(None, Some(400.0));
        assert_eq!(resolve_dimensions(size, (1200, 800), limits()), (600, 400));
    }

    #[test]
    fn height_only_scales_capped_width() {
        // 3000x2000: width capped to 1920 first, then 1920 * 1500/2000
        let size = RequestedSize::new(None, Some(1500.0));
        assert_eq!(resolve_dimensions(size, (3000, 2000), limits()), (1440, 1500));
    }

    #[test]
    fn height_equal_to_source_keeps_capped_width() {
        let size = RequestedSize::new(None, Some(2000.0));
        assert_eq!(resolve_dimensions(size, (3000, 2000), limits()), (1920, 2000));
    }

    #[test]
    fn requested_sides_clamp_to_max_dimension() {
        let size = RequestedSize::new(Some(1e12), Some(1.0));
        assert_eq!(resolve_dimensions(size, (100, 100), limits()), (4096, 1));
    }

    #[test]
    fn derived_side_clamps_to_max_dimension() {
        // 10x10000 at w=4000 → h=4_000_000
        let size = RequestedSize::new(Some(4000.0), None);
        assert_eq!(resolve_dimensions(size, (10, 10000), limits()), (4000, 4096));
    }

    #[test]
    fn neither_caps_long_width() {
        assert_eq!(
            resolve_dimensions(RequestedSize::default(), (3000, 2000), limits()),
            (1920, 1280)
        );
    }

    #[test]
    fn neither_keeps_small_source() {
        assert_eq!(
            resolve_dimensions(RequestedSize::default(), (800, 600), limits()),
            (800, 600)
        );
    }

    #[test]
    fn both_used_as_is() {
        let size = RequestedSize::new(Some(300.0), Some(300.0));
        assert_eq!(resolve_dimensions(size, (1200, 800), limits()), (300, 300));
    }

    #[test]
    fn values_are_rounded() {
        // 1000x333 at w=100 → h=33.3 → 33
        let size = RequestedSize::new(Some(100.0), None);
        assert_eq!(resolve_dimensions(size, (1000, 333), limits()), (100, 33));
        let size = RequestedSize::new(Some(99.6), Some(10.5));
        assert_eq!(resolve_dimensions(size, (1000, 1000), limits()), (100, 11));
    }

    #[test]
    fn values_floor_at_one() {
        // extreme panorama: 10000x10 at w=50 → h=0.05 → 1
        let size = RequestedSize::new(Some(50.0), None);
        assert_eq!(resolve_dimensions(size, (10000, 10), limits()), (50, 1));
        let size = RequestedSize::new(Some(0.0), Some(-5.0));
        assert_eq!(resolve_dimensions(size, (100, 100), limits()), (1, 1));
    }

    // =========================================================================
    // calculate_fill_dimensions tests
    // =========================================================================

    #[test]
    fn fill_wider_source_to_portrait_target() {
        // 800x600 (4:3) → 400x500: height matches, width = 500 * 4/3 = 667
        assert_eq!(calculate_fill_dimensions((800, 600), (400, 500)), (667, 500));
    }

    #[test]
    fn fill_taller_source_to_landscape_target() {
        assert_eq!(calculate_fill_dimensions((600, 800), (500, 400)), (500, 667));
    }

    #[test]
    fn fill_same_aspect_ratio() {
        assert_eq!(calculate_fill_dimensions((800, 600), (400, 300)), (400, 300));
    }

    #[test]
    fn fill_upscales_small_source() {
        assert_eq!(calculate_fill_dimensions((100, 50), (400, 400)), (800, 400));
    }

    // =========================================================================
    // center_crop_origin tests
    // =========================================================================

    #[test]
    fn crop_origin_centers_horizontal_overflow() {
        assert_eq!(center_crop_origin((667, 500), (400, 500)), (133, 0));
    }

    #[test]
    fn crop_origin_centers_vertical_overflow() {
        assert_eq!(center_crop_origin((500, 667), (500, 400)), (0, 133));
    }

    #[test]
    fn crop_origin_exact_fit_is_zero() {
        assert_eq!(center_crop_origin((400, 300), (400, 300)), (0, 0));
    }
}
