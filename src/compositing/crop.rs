//! Square region extraction

use super::surface::{self, WHITE};
use crate::error::{Result, RetouchError};
use crate::types::{CropRegion, FocusPoint};
use image::{imageops, RgbaImage};

/// Default crop side length used by the refinement flow
pub const DEFAULT_CROP_SIZE: u32 = 1024;

/// Output of [`extract_square`]
#[derive(Debug, Clone)]
pub struct ExtractedCrop {
    /// `size x size` canvas handed to the user or to a patch generator
    pub canvas: RgbaImage,
    /// Source-pixel footprint actually copied into the canvas
    ///
    /// Not square when padded: an axis shorter than the crop size keeps the
    /// image's own extent on that axis.
    pub region: CropRegion,
    /// Top-left of the copied pixels inside the canvas (non-zero when padded)
    pub placement: (u32, u32),
}

impl ExtractedCrop {
    /// Side length of the canvas
    #[must_use]
    pub fn size(&self) -> u32 {
        self.canvas.width()
    }

    #[must_use]
    pub fn is_padded(&self) -> bool {
        self.region.dimensions() != self.canvas.dimensions()
    }

    /// Cut the region footprint back out of a canvas-sized image
    ///
    /// Images of another size (patch generators may answer at a different
    /// resolution) are first scaled to the canvas size.
    pub fn footprint_of(&self, patch: &RgbaImage) -> Result<RgbaImage> {
        let scaled;
        let patch = if patch.dimensions() == self.canvas.dimensions() {
            patch
        } else {
            surface::ensure_drawable(patch.width(), patch.height())?;
            scaled = imageops::resize(
                patch,
                self.canvas.width(),
                self.canvas.height(),
                imageops::FilterType::Triangle,
            );
            &scaled
        };
        let (px, py) = self.placement;
        surface::copy_region(
            patch,
            CropRegion::new(px, py, self.region.width, self.region.height),
        )
    }
}

/// Origin, extent and canvas offset along one axis
fn axis_span(center: u32, dimension: u32, size: u32) -> (u32, u32, u32) {
    if dimension >= size {
        let ideal = i64::from(center) - i64::from(size / 2);
        let origin = ideal.clamp(0, i64::from(dimension - size)) as u32;
        (origin, size, 0)
    } else {
        (0, dimension, (size - dimension) / 2)
    }
}

/// Extract a `size x size` square centred as closely as possible on `center`
///
/// Axes at least `size` long are cropped with the origin clamped into
/// `[0, dimension - size]`. Shorter axes are copied whole and centred on a
/// white canvas; the returned region then covers the actual image extent.
pub fn extract_square(image: &RgbaImage, center: FocusPoint, size: u32) -> Result<ExtractedCrop> {
    if size == 0 {
        return Err(RetouchError::validation("Crop size must be positive"));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(RetouchError::validation("Cannot crop an empty image"));
    }

    let (x, extent_x, offset_x) = axis_span(center.x, width, size);
    let (y, extent_y, offset_y) = axis_span(center.y, height, size);
    let region = CropRegion::new(x, y, extent_x, extent_y);

    let copied = surface::copy_region(image, region)?;
    let canvas = if copied.dimensions() == (size, size) {
        copied
    } else {
        let mut canvas = surface::allocate(size, size, WHITE)?;
        imageops::replace(&mut canvas, &copied, i64::from(offset_x), i64::from(offset_y));
        canvas
    };

    log::debug!("Extracted {}px crop covering {}", size, region);
    Ok(ExtractedCrop {
        canvas,
        region,
        placement: (offset_x, offset_y),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 7, 255])
        })
    }

    #[test]
    fn test_centered_crop() {
        let image = gradient(100, 80);
        let crop = extract_square(&image, FocusPoint::new(50, 40), 20).unwrap();
        assert_eq!(crop.region, CropRegion::new(40, 30, 20, 20));
        assert_eq!(crop.canvas.dimensions(), (20, 20));
        assert_eq!(crop.canvas.get_pixel(0, 0), &Rgba([40, 30, 7, 255]));
        assert!(!crop.is_padded());
    }

    #[test]
    fn test_clamped_at_both_edges() {
        let image = gradient(100, 100);
        let near = extract_square(&image, FocusPoint::new(2, 3), 30).unwrap();
        assert_eq!(near.region, CropRegion::new(0, 0, 30, 30));

        let far = extract_square(&image, FocusPoint::new(99, 500), 30).unwrap();
        assert_eq!(far.region, CropRegion::new(70, 70, 30, 30));
    }

    #[test]
    fn test_small_image_is_padded_and_centered() {
        let image = gradient(10, 6);
        let crop = extract_square(&image, FocusPoint::new(5, 3), 20).unwrap();

        assert_eq!(crop.canvas.dimensions(), (20, 20));
        assert_eq!(crop.region, CropRegion::new(0, 0, 10, 6));
        assert_eq!(crop.placement, (5, 7));
        assert!(crop.is_padded());
        assert_eq!(crop.canvas.get_pixel(0, 0), &WHITE);
        assert_eq!(crop.canvas.get_pixel(5, 7), &Rgba([0, 0, 7, 255]));
        assert_eq!(crop.canvas.get_pixel(14, 12), &Rgba([9, 5, 7, 255]));
        assert_eq!(crop.canvas.get_pixel(15, 13), &WHITE);
    }

    #[test]
    fn test_mixed_axes_crop_one_pad_other() {
        let image = gradient(50, 10);
        let crop = extract_square(&image, FocusPoint::new(40, 5), 20).unwrap();
        assert_eq!(crop.region, CropRegion::new(30, 0, 20, 10));
        assert_eq!(crop.placement, (0, 5));
        assert_eq!(crop.canvas.dimensions(), (20, 20));
        assert!(crop.is_padded());
        assert!(!crop.region.is_square());
    }

    #[test]
    fn test_footprint_of_recovers_region() {
        let image = gradient(10, 6);
        let crop = extract_square(&image, FocusPoint::new(0, 0), 20).unwrap();

        let footprint = crop.footprint_of(&crop.canvas).unwrap();
        assert_eq!(footprint, image);

        let doubled = imageops::resize(&crop.canvas, 40, 40, imageops::FilterType::Nearest);
        let footprint = crop.footprint_of(&doubled).unwrap();
        assert_eq!(footprint.dimensions(), (10, 6));
    }

    #[test]
    fn test_zero_size_rejected() {
        let image = gradient(10, 10);
        assert!(matches!(
            extract_square(&image, FocusPoint::new(5, 5), 0),
            Err(RetouchError::Validation(_))
        ));
    }
}
