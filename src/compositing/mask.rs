//! Feathered mask blending

use super::surface;
use crate::error::{Result, RetouchError};
use crate::types::CropRegion;
use image::{imageops, GrayImage, Luma, RgbaImage};

/// Default standard deviation of the feathering blur (pixels)
pub const DEFAULT_FEATHER_SIGMA: f32 = 15.0;

/// Surface the user painted the coverage on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskExtent {
    /// Painted over the crop display; the whole mask maps onto the region
    #[default]
    Crop,
    /// Painted over a display of the whole base image; only the
    /// sub-rectangle under the region is used
    FullImage,
}

impl std::str::FromStr for MaskExtent {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "crop" => Ok(Self::Crop),
            "image" | "full" | "full-image" => Ok(Self::FullImage),
            other => Err(RetouchError::invalid_config(format!(
                "Unknown mask extent '{}' (expected crop or image)",
                other
            ))),
        }
    }
}

/// Painted coverage, where non-zero marks "keep generated content"
#[derive(Debug, Clone, PartialEq)]
pub struct MaskStrokes {
    coverage: GrayImage,
    extent: MaskExtent,
}

impl MaskStrokes {
    #[must_use]
    pub fn new(coverage: GrayImage, extent: MaskExtent) -> Self {
        Self { coverage, extent }
    }

    /// Take coverage from the alpha channel of a painted RGBA layer
    #[must_use]
    pub fn from_alpha(layer: &RgbaImage, extent: MaskExtent) -> Self {
        let coverage = GrayImage::from_fn(layer.width(), layer.height(), |x, y| {
            Luma([layer.get_pixel(x, y)[3]])
        });
        Self::new(coverage, extent)
    }

    /// Fully painted mask of the given authoring size
    pub fn opaque(width: u32, height: u32, extent: MaskExtent) -> Result<Self> {
        let mut coverage = surface::allocate_mask(width, height)?;
        coverage.fill(255);
        Ok(Self::new(coverage, extent))
    }

    /// Unpainted mask of the given authoring size
    pub fn empty(width: u32, height: u32, extent: MaskExtent) -> Result<Self> {
        Ok(Self::new(surface::allocate_mask(width, height)?, extent))
    }

    #[must_use]
    pub fn coverage(&self) -> &GrayImage {
        &self.coverage
    }

    #[must_use]
    pub fn extent(&self) -> MaskExtent {
        self.extent
    }

    /// Whether any pixel is painted
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.coverage.pixels().all(|p| p[0] == 0)
    }

    /// Rescale the coverage onto `region` of a `base_width x base_height` image
    fn rescale_to(&self, region: CropRegion, base_width: u32, base_height: u32) -> Result<GrayImage> {
        let (mask_width, mask_height) = self.coverage.dimensions();
        surface::ensure_drawable(mask_width, mask_height)?;

        let source = match self.extent {
            MaskExtent::Crop => self.coverage.clone(),
            MaskExtent::FullImage => {
                let scale = |value: u32, mask_dim: u32, base_dim: u32| {
                    (u64::from(value) * u64::from(mask_dim) / u64::from(base_dim.max(1))) as u32
                };
                let x = scale(region.x, mask_width, base_width).min(mask_width - 1);
                let y = scale(region.y, mask_height, base_height).min(mask_height - 1);
                let width = scale(region.width, mask_width, base_width)
                    .clamp(1, mask_width - x);
                let height = scale(region.height, mask_height, base_height)
                    .clamp(1, mask_height - y);
                imageops::crop_imm(&self.coverage, x, y, width, height).to_image()
            },
        };

        if source.dimensions() == region.dimensions() {
            Ok(source)
        } else {
            Ok(imageops::resize(
                &source,
                region.width,
                region.height,
                imageops::FilterType::Triangle,
            ))
        }
    }
}

/// Alpha-mask-weighted compositor with edge feathering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskCompositor {
    feather_sigma: f32,
}

impl Default for MaskCompositor {
    fn default() -> Self {
        Self::new(DEFAULT_FEATHER_SIGMA)
    }
}

impl MaskCompositor {
    #[must_use]
    pub fn new(feather_sigma: f32) -> Self {
        Self { feather_sigma }
    }

    #[must_use]
    pub fn feather_sigma(&self) -> f32 {
        self.feather_sigma
    }

    /// Blend `replacement` into `base` at `region`, weighted by the feathered mask
    ///
    /// Pixels outside `region` are copied from `base` unchanged. Inside, each
    /// pixel interpolates between base and replacement by the blurred coverage.
    #[tracing::instrument(skip_all, fields(region = %region, sigma = self.feather_sigma))]
    pub fn blend(
        &self,
        base: &RgbaImage,
        replacement: &RgbaImage,
        strokes: &MaskStrokes,
        region: CropRegion,
    ) -> Result<RgbaImage> {
        let mut output = surface::duplicate(base)?;

        if replacement.dimensions() != region.dimensions() {
            return Err(RetouchError::dimension_mismatch(format!(
                "Replacement is {}x{} but the crop region is {}x{}",
                replacement.width(),
                replacement.height(),
                region.width,
                region.height
            )));
        }
        if !region.fits_within(base.width(), base.height()) {
            return Err(RetouchError::dimension_mismatch(format!(
                "Region {} lies outside the {}x{} base image",
                region,
                base.width(),
                base.height()
            )));
        }
        surface::ensure_drawable(region.width, region.height)?;

        let mask = strokes.rescale_to(region, base.width(), base.height())?;
        let feathered = surface::blur_mask(&mask, self.feather_sigma);

        let mut scratch = replacement.clone();
        surface::retain_under_mask(&mut scratch, &feathered)?;
        surface::composite_over(&mut output, &scratch, region.x, region.y)?;

        log::debug!("Blended {} with feather sigma {}", region, self.feather_sigma);
        Ok(output)
    }
}

/// [`MaskCompositor::blend`] with the default feathering
pub fn blend(
    base: &RgbaImage,
    replacement: &RgbaImage,
    strokes: &MaskStrokes,
    region: CropRegion,
) -> Result<RgbaImage> {
    MaskCompositor::default().blend(base, replacement, strokes, region)
}
