//! Export format handling service
//!
//! This module keeps encoding of composited images separate from the
//! compositing and pipeline logic.

use crate::error::{Result, RetouchError};
use crate::types::{ImageBuffer, MimeType};
use image::{codecs::jpeg::JpegEncoder, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// JPEG quality used for exports
pub const JPEG_QUALITY: u8 = 90;

/// Encodings a working image can be exported as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    WebP,
}

impl ExportFormat {
    /// File extension (without the dot)
    ///
    /// # Examples
    /// ```rust
    /// use retouch_pipeline::services::ExportFormat;
    ///
    /// assert_eq!(ExportFormat::Png.extension(), "png");
    /// assert_eq!(ExportFormat::Jpeg.extension(), "jpg");
    /// ```
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    #[must_use]
    pub fn mime(&self) -> MimeType {
        match self {
            Self::Png => MimeType::Png,
            Self::Jpeg => MimeType::Jpeg,
            Self::WebP => MimeType::WebP,
        }
    }

    #[must_use]
    pub fn supports_transparency(&self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    /// Format matching a path's extension, if any
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?;
        extension.parse().ok()
    }

    /// Encode an RGBA image
    ///
    /// JPEG output is flattened onto white first since it carries no alpha.
    pub fn encode(&self, image: &RgbaImage) -> Result<ImageBuffer> {
        let mut cursor = Cursor::new(Vec::new());
        match self {
            Self::Png => image.write_to(&mut cursor, ImageFormat::Png)?,
            Self::Jpeg => {
                let flattened = flatten_on_white(image);
                let mut encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
                encoder.encode_image(&flattened)?;
            },
            Self::WebP => Self::encode_webp(image, &mut cursor)?,
        }
        Ok(ImageBuffer::new(cursor.into_inner(), self.mime()))
    }

    #[cfg(feature = "webp-support")]
    fn encode_webp(image: &RgbaImage, cursor: &mut Cursor<Vec<u8>>) -> Result<()> {
        image.write_to(cursor, ImageFormat::WebP)?;
        Ok(())
    }

    #[cfg(not(feature = "webp-support"))]
    fn encode_webp(_image: &RgbaImage, _cursor: &mut Cursor<Vec<u8>>) -> Result<()> {
        Err(RetouchError::invalid_config(
            "WebP export requires the webp-support feature",
        ))
    }

    /// Encode and write to `path`, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(&self, image: &RgbaImage, path: P) -> Result<()> {
        let path = path.as_ref();
        let encoded = self.encode(image)?;
        write_buffer(&encoded, path)?;
        log::debug!(
            "Saved {}x{} {} export to {}",
            image.width(),
            image.height(),
            self.extension(),
            path.display()
        );
        Ok(())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            other => Err(RetouchError::invalid_config(format!(
                "Unsupported export format '{}' (expected png, jpeg or webp)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Composite an RGBA image over an opaque white background
#[must_use]
pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let alpha = u32::from(pixel[3]);
        let channel = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([channel(pixel[0]), channel(pixel[1]), channel(pixel[2])])
    })
}

/// Write already-encoded bytes to `path`, creating parent directories
pub fn write_buffer<P: AsRef<Path>>(buffer: &ImageBuffer, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RetouchError::file_io_error("create output directory", parent, &e)
            })?;
        }
    }
    std::fs::write(path, buffer.bytes())
        .map_err(|e| RetouchError::file_io_error("write image", path, &e))
}
