//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Largest size with the source aspect ratio that fits inside `bounds`.
///
/// Sources already inside the box are returned unchanged; nothing is ever
/// upscaled. Neither output edge drops below 1.
///
/// ```
/// # use archivist::imaging::fit_within;
/// assert_eq!(fit_within((4000, 3000), (1024, 1024)), (1024, 768));
/// assert_eq!(fit_within((300, 200), (1024, 1024)), (300, 200));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w == 0 || src_h == 0 || (src_w <= max_w && src_h <= max_h) {
        return source;
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Resolution in megapixels, rounded to two decimals.
pub fn megapixels(width: u32, height: u32) -> f64 {
    let mp = width as f64 * height as f64 / 1_000_000.0;
    (mp * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_within
    // =========================================================================

    #[test]
    fn landscape_is_limited_by_width() {
        assert_eq!(fit_within((4000, 3000), (1024, 1024)), (1024, 768));
    }

    #[test]
    fn portrait_is_limited_by_height() {
        assert_eq!(fit_within((3000, 4000), (384, 384)), (288, 384));
    }

    #[test]
    fn small_source_is_not_upscaled() {
        assert_eq!(fit_within((100, 50), (384, 384)), (100, 50));
        assert_eq!(fit_within((384, 384), (384, 384)), (384, 384));
    }

    #[test]
    fn extreme_aspect_never_collapses_to_zero() {
        let (w, h) = fit_within((10000, 1), (100, 100));
        assert_eq!(w, 100);
        assert_eq!(h, 1);
    }

    #[test]
    fn zero_source_is_passed_through() {
        assert_eq!(fit_within((0, 0), (100, 100)), (0, 0));
    }

    // =========================================================================
    // megapixels
    // =========================================================================

    #[test]
    fn megapixels_rounds_to_two_decimals() {
        assert_eq!(megapixels(4000, 3000), 12.0);
        assert_eq!(megapixels(1920, 1080), 2.07);
        assert_eq!(megapixels(1, 1), 0.0);
    }
}
