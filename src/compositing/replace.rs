//! Hard rectangular replacement

use super::surface;
use crate::error::{Result, RetouchError};
use crate::tracing_config::spans;
use crate::types::CropRegion;
use image::{imageops, RgbaImage};

/// Draw `base`, then overwrite `region` with `replacement` scaled to fit
///
/// No masking or feathering is applied.
pub fn replace(base: &RgbaImage, replacement: &RgbaImage, region: CropRegion) -> Result<RgbaImage> {
    if !region.fits_within(base.width(), base.height()) {
        return Err(RetouchError::dimension_mismatch(format!(
            "Region {} lies outside the {}x{} base image",
            region,
            base.width(),
            base.height()
        )));
    }
    surface::ensure_drawable(region.width, region.height)?;
    surface::ensure_drawable(replacement.width(), replacement.height())?;
    let _span = spans::compositing("replace", region.width, region.height).entered();

    let mut output = surface::duplicate(base)?;
    if replacement.dimensions() == region.dimensions() {
        imageops::replace(&mut output, replacement, i64::from(region.x), i64::from(region.y));
    } else {
        let scaled = imageops::resize(
            replacement,
            region.width,
            region.height,
            imageops::FilterType::Triangle,
        );
        imageops::replace(&mut output, &scaled, i64::from(region.x), i64::from(region.y));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_replace_overwrites_region_only() {
        let base = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let patch = RgbaImage::from_pixel(3, 2, Rgba([9, 9, 9, 128]));
        let region = CropRegion::new(2, 3, 3, 2);

        let out = replace(&base, &patch, region).unwrap();
        for (x, y, pixel) in out.enumerate_pixels() {
            if region.contains(x, y) {
                // Overwrite keeps the replacement's own alpha
                assert_eq!(pixel, &Rgba([9, 9, 9, 128]));
            } else {
                assert_eq!(pixel, &Rgba([0, 0, 0, 255]));
            }
        }
    }

    #[test]
    fn test_replacement_scaled_to_region() {
        let base = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let patch = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 255]));
        let out = replace(&base, &patch, CropRegion::new(5, 5, 8, 8)).unwrap();
        assert_eq!(out.get_pixel(8, 8), &Rgba([200, 100, 50, 255]));
        assert_eq!(out.get_pixel(13, 13), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_region_outside_base() {
        let base = RgbaImage::new(10, 10);
        let patch = RgbaImage::new(4, 4);
        assert!(matches!(
            replace(&base, &patch, CropRegion::new(8, 8, 4, 4)),
            Err(RetouchError::DimensionMismatch(_))
        ));
        assert!(matches!(
            replace(&base, &patch, CropRegion::new(0, 0, 0, 4)),
            Err(RetouchError::RenderingUnavailable(_))
        ));
    }
}
