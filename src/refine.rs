//! Interactive refinement of a working image
//!
//! A session owns the working image and at most one selected crop. The
//! selection's [`CropRegion`] lives only as long as the session holds it:
//! applying a patch or selecting again discards it.

use crate::compositing::{extract_square, replace, ExtractedCrop, MaskCompositor, MaskStrokes};
use crate::error::{Result, RetouchError};
use crate::remote::PatchGenerator;
use crate::services::ExportFormat;
use crate::types::{CropRegion, FocusPoint, ImageBuffer};
use image::RgbaImage;

/// Local compositing session over one image
#[derive(Debug, Clone)]
pub struct RefinementSession {
    original: RgbaImage,
    working: RgbaImage,
    selection: Option<ExtractedCrop>,
    /// Replacement pixels for the selected region, sized to its footprint
    patch: Option<RgbaImage>,
}

impl RefinementSession {
    pub fn new(image: RgbaImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RetouchError::validation("Cannot refine an empty image"));
        }
        Ok(Self {
            original: image.clone(),
            working: image,
            selection: None,
            patch: None,
        })
    }

    /// Start from an encoded image such as a job's Stage-1 result
    pub fn from_buffer(buffer: &ImageBuffer) -> Result<Self> {
        Self::new(buffer.decode()?)
    }

    #[must_use]
    pub fn working_image(&self) -> &RgbaImage {
        &self.working
    }

    #[must_use]
    pub fn into_working_image(self) -> RgbaImage {
        self.working
    }

    #[must_use]
    pub fn selection(&self) -> Option<&ExtractedCrop> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn region(&self) -> Option<CropRegion> {
        self.selection.as_ref().map(|crop| crop.region)
    }

    #[must_use]
    pub fn patch(&self) -> Option<&RgbaImage> {
        self.patch.as_ref()
    }

    /// Select a `size x size` crop around `center`, discarding any pending patch
    pub fn select(&mut self, center: FocusPoint, size: u32) -> Result<&ExtractedCrop> {
        let crop = extract_square(&self.working, center, size)?;
        log::debug!("Selected {} around ({}, {})", crop.region, center.x, center.y);
        self.patch = None;
        Ok(self.selection.insert(crop))
    }

    fn current_selection(&self) -> Result<&ExtractedCrop> {
        self.selection
            .as_ref()
            .ok_or_else(|| RetouchError::processing("No region selected"))
    }

    /// Encoded crop canvas, as sent to a patch generator
    pub fn crop_buffer(&self) -> Result<ImageBuffer> {
        ImageBuffer::encode_png(&self.current_selection()?.canvas)
    }

    /// Use a user-supplied canvas-sized image as the patch
    pub fn set_patch(&mut self, canvas_patch: &RgbaImage) -> Result<()> {
        let footprint = self.current_selection()?.footprint_of(canvas_patch)?;
        self.patch = Some(footprint);
        Ok(())
    }

    /// Regenerate the selected crop remotely and keep the result as the patch
    pub async fn generate_patch(
        &mut self,
        generator: &dyn PatchGenerator,
        prompt: &str,
    ) -> Result<&RgbaImage> {
        let crop = self.crop_buffer()?;
        let generated = generator.generate_patch(&crop, prompt).await?.decode()?;
        let footprint = self.current_selection()?.footprint_of(&generated)?;
        log::info!("🪄 Generated {}x{} patch", footprint.width(), footprint.height());
        Ok(self.patch.insert(footprint))
    }

    fn pending(&self) -> Result<(CropRegion, &RgbaImage)> {
        let region = self.current_selection()?.region;
        let patch = self
            .patch
            .as_ref()
            .ok_or_else(|| RetouchError::processing("No patch to apply"))?;
        Ok((region, patch))
    }

    /// Install a composited result; the selection and patch are spent
    fn commit(&mut self, composited: RgbaImage) {
        self.working = composited;
        self.selection = None;
        self.patch = None;
    }

    /// Blend the patch into the working image through feathered strokes
    ///
    /// On failure the selection and patch are kept so the edit can be retried.
    pub fn apply_mask(&mut self, strokes: &MaskStrokes, feather_sigma: f32) -> Result<()> {
        let (region, patch) = self.pending()?;
        let composited =
            MaskCompositor::new(feather_sigma).blend(&self.working, patch, strokes, region)?;
        self.commit(composited);
        Ok(())
    }

    /// Overwrite the selected region with the patch
    pub fn apply_replacement(&mut self) -> Result<()> {
        let (region, patch) = self.pending()?;
        let composited = replace(&self.working, patch, region)?;
        self.commit(composited);
        Ok(())
    }

    /// Discard all edits
    pub fn reset(&mut self) {
        self.working = self.original.clone();
        self.selection = None;
        self.patch = None;
    }

    pub fn export(&self, format: ExportFormat) -> Result<ImageBuffer> {
        format.encode(&self.working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositing::MaskExtent;
    use crate::remote::test_utils::MockPatchGenerator;
    use crate::types::MimeType;
    use image::Rgba;

    const BASE: Rgba<u8> = Rgba([30, 30, 30, 255]);
    const PATCH: [u8; 4] = [240, 10, 10, 255];

    fn session(width: u32, height: u32) -> RefinementSession {
        RefinementSession::new(RgbaImage::from_pixel(width, height, BASE)).unwrap()
    }

    #[test]
    fn test_operations_require_selection() {
        let mut session = session(16, 16);
        assert!(session.crop_buffer().is_err());
        assert!(session.apply_replacement().is_err());

        session.select(FocusPoint::new(8, 8), 8).unwrap();
        // Selected but no patch yet
        assert!(matches!(
            session.apply_replacement(),
            Err(RetouchError::Processing(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_and_replace() {
        let mut session = session(64, 64);
        let generator = MockPatchGenerator::new(PATCH);

        let region = session.select(FocusPoint::new(10, 10), 16).unwrap().region;
        assert_eq!(region, CropRegion::new(2, 2, 16, 16));

        let patch = session.generate_patch(&generator, "smooth skin").await.unwrap();
        assert_eq!(patch.dimensions(), (16, 16));
        assert_eq!(generator.prompts(), vec!["smooth skin".to_string()]);

        session.apply_replacement().unwrap();
        let working = session.working_image();
        assert_eq!(working.get_pixel(2, 2), &Rgba(PATCH));
        assert_eq!(working.get_pixel(17, 17), &Rgba(PATCH));
        assert_eq!(working.get_pixel(18, 18), &BASE);
        assert!(session.selection().is_none());
    }

    #[tokio::test]
    async fn test_padded_selection_patches_only_footprint() {
        let mut session = session(8, 6);
        let generator = MockPatchGenerator::new(PATCH);

        let crop = session.select(FocusPoint::new(4, 3), 16).unwrap();
        assert!(crop.is_padded());
        session.generate_patch(&generator, "fill").await.unwrap();
        assert_eq!(session.patch().unwrap().dimensions(), (8, 6));

        session.apply_replacement().unwrap();
        assert!(session.working_image().pixels().all(|p| *p == Rgba(PATCH)));
    }

    #[test]
    fn test_mask_blend_and_reset() {
        let mut session = session(32, 32);
        session.select(FocusPoint::new(16, 16), 8).unwrap();
        session
            .set_patch(&RgbaImage::from_pixel(8, 8, Rgba(PATCH)))
            .unwrap();

        let strokes = MaskStrokes::opaque(8, 8, MaskExtent::Crop).unwrap();
        session.apply_mask(&strokes, 0.0).unwrap();
        assert_eq!(session.working_image().get_pixel(15, 15), &Rgba(PATCH));
        assert_eq!(session.working_image().get_pixel(0, 0), &BASE);

        session.reset();
        assert!(session.working_image().pixels().all(|p| *p == BASE));
    }

    #[test]
    fn test_failed_blend_keeps_pending_edit() {
        let mut session = session(64, 64);
        session.select(FocusPoint::new(32, 32), 16).unwrap();
        session
            .set_patch(&RgbaImage::from_pixel(16, 16, Rgba(PATCH)))
            .unwrap();

        let oversized = MaskStrokes::new(
            image::GrayImage::new(crate::compositing::MAX_SURFACE_DIMENSION + 1, 1),
            MaskExtent::Crop,
        );
        let err = session.apply_mask(&oversized, 2.0).unwrap_err();
        assert!(matches!(err, RetouchError::RenderingUnavailable(_)));

        assert_eq!(session.region(), Some(CropRegion::new(24, 24, 16, 16)));
        assert!(session.patch().is_some());
        assert!(session.working_image().pixels().all(|p| *p == BASE));

        // The kept edit can still be applied
        session.apply_replacement().unwrap();
        assert_eq!(session.working_image().get_pixel(24, 24), &Rgba(PATCH));
        assert!(session.region().is_none());
        assert!(session.patch().is_none());
    }

    #[test]
    fn test_export() {
        let session = session(4, 4);
        let png = session.export(ExportFormat::Png).unwrap();
        assert_eq!(png.mime(), MimeType::Png);
        assert_eq!(png.decode().unwrap(), *session.working_image());
    }

    #[test]
    fn test_empty_image_rejected() {
        assert!(RefinementSession::new(RgbaImage::new(0, 0)).is_err());
    }
}
