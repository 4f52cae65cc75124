//! Minimal raster surface operations
//!
//! Everything the compositing engine draws goes through these helpers:
//! allocate, copy-region, alpha-composite and blur.

use crate::error::{Result, RetouchError};
use crate::types::CropRegion;
use image::{imageops, GrayImage, Rgba, RgbaImage};

/// Largest side length a drawing surface may have
pub const MAX_SURFACE_DIMENSION: u32 = 16_384;

/// Opaque white, used for crop padding and JPEG flattening
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Fail with `RenderingUnavailable` unless a `width x height` surface can be drawn
pub fn ensure_drawable(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RetouchError::rendering_unavailable(format!(
            "Cannot allocate an empty {}x{} surface",
            width, height
        )));
    }
    if width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION {
        return Err(RetouchError::rendering_unavailable(format!(
            "Surface {}x{} exceeds the {}px limit",
            width, height, MAX_SURFACE_DIMENSION
        )));
    }
    Ok(())
}

/// Allocate a surface filled with `fill`
pub fn allocate(width: u32, height: u32, fill: Rgba<u8>) -> Result<RgbaImage> {
    ensure_drawable(width, height)?;
    Ok(RgbaImage::from_pixel(width, height, fill))
}

/// Copy of `source` usable as an output canvas
pub fn duplicate(source: &RgbaImage) -> Result<RgbaImage> {
    ensure_drawable(source.width(), source.height())?;
    Ok(source.clone())
}

/// Allocate a coverage mask
pub fn allocate_mask(width: u32, height: u32) -> Result<GrayImage> {
    ensure_drawable(width, height)?;
    Ok(GrayImage::new(width, height))
}

/// Copy `region` out of `source`
pub fn copy_region(source: &RgbaImage, region: CropRegion) -> Result<RgbaImage> {
    if !region.fits_within(source.width(), source.height()) {
        return Err(RetouchError::dimension_mismatch(format!(
            "Region {} lies outside the {}x{} image",
            region,
            source.width(),
            source.height()
        )));
    }
    ensure_drawable(region.width, region.height)?;
    Ok(imageops::crop_imm(source, region.x, region.y, region.width, region.height).to_image())
}

/// Gaussian low-pass over a coverage mask; `sigma <= 0` leaves it untouched
#[must_use]
pub fn blur_mask(mask: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        imageops::blur(mask, sigma)
    } else {
        mask.clone()
    }
}

/// Keep `surface` only where `mask` has coverage (destination-in)
pub fn retain_under_mask(surface: &mut RgbaImage, mask: &GrayImage) -> Result<()> {
    if surface.dimensions() != mask.dimensions() {
        return Err(RetouchError::dimension_mismatch(format!(
            "Mask is {}x{} but the surface is {}x{}",
            mask.width(),
            mask.height(),
            surface.width(),
            surface.height()
        )));
    }
    for (pixel, coverage) in surface.pixels_mut().zip(mask.pixels()) {
        pixel[3] = mul_div255(u32::from(pixel[3]), u32::from(coverage[0]));
    }
    Ok(())
}

/// Draw `source` over `target` with its top-left corner at `(x, y)` (source-over)
pub fn composite_over(target: &mut RgbaImage, source: &RgbaImage, x: u32, y: u32) -> Result<()> {
    let footprint = CropRegion::new(x, y, source.width(), source.height());
    if !footprint.fits_within(target.width(), target.height()) {
        return Err(RetouchError::dimension_mismatch(format!(
            "Cannot draw a {}x{} surface at ({}, {}) on a {}x{} canvas",
            source.width(),
            source.height(),
            x,
            y,
            target.width(),
            target.height()
        )));
    }

    for (sx, sy, src) in source.enumerate_pixels() {
        let alpha = u32::from(src[3]);
        if alpha == 0 {
            continue;
        }
        let dst = target.get_pixel_mut(x + sx, y + sy);
        if alpha == 255 {
            *dst = *src;
            continue;
        }
        let inverse = 255 - alpha;
        for channel in 0..3 {
            dst[channel] = ((alpha * u32::from(src[channel])
                + inverse * u32::from(dst[channel])
                + 127)
                / 255) as u8;
        }
        dst[3] = (alpha + mul_div255(u32::from(dst[3]), inverse) as u32).min(255) as u8;
    }
    Ok(())
}

fn mul_div255(a: u32, b: u32) -> u8 {
    ((a * b + 127) / 255) as u8
}
