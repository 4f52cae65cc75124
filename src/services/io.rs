//! Image intake service
//!
//! Validates uploads before they become jobs: size ceiling, accepted MIME
//! types and decodability. File reading lives here so the pipeline itself
//! only ever sees validated [`ImageBuffer`]s.

use crate::error::{Result, RetouchError};
use crate::types::{ImageBuffer, MimeType};
use std::path::Path;

/// Largest accepted upload (10 MB)
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// MIME types accepted at intake
pub const ACCEPTED_MIME_TYPES: [MimeType; 3] = [MimeType::Jpeg, MimeType::Png, MimeType::WebP];

/// Service validating and loading source images
#[derive(Debug, Clone, Copy)]
pub struct ImageIntake {
    max_bytes: usize,
}

impl Default for ImageIntake {
    fn default() -> Self {
        Self::new(MAX_INPUT_BYTES)
    }
}

impl ImageIntake {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check whether a path has an accepted image extension
    ///
    /// # Examples
    /// ```rust
    /// use retouch_pipeline::services::ImageIntake;
    ///
    /// assert!(ImageIntake::is_supported_extension("ring.JPG"));
    /// assert!(!ImageIntake::is_supported_extension("notes.txt"));
    /// ```
    pub fn is_supported_extension<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp"
                )
            })
    }

    /// Validate raw upload bytes and wrap them in an [`ImageBuffer`]
    ///
    /// `declared_mime` is the type claimed by the uploader. It must be an
    /// accepted type when present; the stored type always comes from the
    /// content itself.
    pub fn accept_bytes(&self, data: Vec<u8>, declared_mime: Option<&str>) -> Result<ImageBuffer> {
        if data.is_empty() {
            return Err(RetouchError::validation("Image file is empty"));
        }
        if data.len() > self.max_bytes {
            return Err(RetouchError::validation(format!(
                "Image is {} bytes, larger than the {} byte limit",
                data.len(),
                self.max_bytes
            )));
        }

        let declared = match declared_mime {
            Some(mime) => Some(MimeType::from_mime_str(mime).ok_or_else(|| {
                RetouchError::validation(format!(
                    "Unsupported file type '{}' (expected image/jpeg, image/png or image/webp)",
                    mime
                ))
            })?),
            None => None,
        };

        let sniffed = MimeType::sniff(&data).ok_or_else(|| {
            RetouchError::validation("File content is not a JPEG, PNG or WebP image")
        })?;
        if let Some(declared) = declared.filter(|d| *d != sniffed) {
            log::warn!("Upload declared {} but content is {}; using {}", declared, sniffed, sniffed);
        }

        let buffer = ImageBuffer::new(data, sniffed);
        buffer
            .decode()
            .map_err(|e| RetouchError::validation(format!("Image could not be decoded: {}", e)))?;
        Ok(buffer)
    }

    /// Load and validate an image file, returning it with its file name
    ///
    /// # Examples
    /// ```rust,no_run
    /// use retouch_pipeline::services::ImageIntake;
    ///
    /// let (buffer, name) = ImageIntake::default().load_path("ring.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<(ImageBuffer, String)> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path)
            .map_err(|e| RetouchError::file_io_error("read image file", path, &e))?;
        if metadata.len() > self.max_bytes as u64 {
            return Err(RetouchError::validation(format!(
                "{} is {} bytes, larger than the {} byte limit",
                path.display(),
                metadata.len(),
                self.max_bytes
            )));
        }

        let data =
            std::fs::read(path).map_err(|e| RetouchError::file_io_error("read image data", path, &e))?;
        let buffer = self.accept_bytes(data, None)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        log::debug!("Loaded {} ({} bytes, {})", name, buffer.len(), buffer.mime());
        Ok((buffer, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_utils::sample_png;
    use tempfile::tempdir;

    #[test]
    fn test_supported_extensions() {
        assert!(ImageIntake::is_supported_extension("a.jpg"));
        assert!(ImageIntake::is_supported_extension("a.jpeg"));
        assert!(ImageIntake::is_supported_extension("a.PNG"));
        assert!(ImageIntake::is_supported_extension("a.webp"));
        assert!(!ImageIntake::is_supported_extension("a.gif"));
        assert!(!ImageIntake::is_supported_extension("a"));
    }

    #[test]
    fn test_accepts_png_bytes() {
        let png = sample_png(4, 4, [1, 2, 3, 255]);
        let buffer = ImageIntake::default()
            .accept_bytes(png.bytes().to_vec(), Some("image/png"))
            .unwrap();
        assert_eq!(buffer.mime(), MimeType::Png);
    }

    #[test]
    fn test_content_wins_over_declared_type() {
        let png = sample_png(4, 4, [1, 2, 3, 255]);
        let buffer = ImageIntake::default()
            .accept_bytes(png.bytes().to_vec(), Some("image/jpeg"))
            .unwrap();
        assert_eq!(buffer.mime(), MimeType::Png);
    }

    #[test]
    fn test_rejects_unsupported_and_oversized() {
        let intake = ImageIntake::new(64);
        let png = sample_png(4, 4, [1, 2, 3, 255]);

        assert!(matches!(
            ImageIntake::default().accept_bytes(png.bytes().to_vec(), Some("image/gif")),
            Err(RetouchError::Validation(_))
        ));
        assert!(matches!(
            intake.accept_bytes(vec![0u8; 65], None),
            Err(RetouchError::Validation(_))
        ));
        assert!(matches!(
            intake.accept_bytes(Vec::new(), None),
            Err(RetouchError::Validation(_))
        ));
        assert!(matches!(
            ImageIntake::default().accept_bytes(b"plain text, not an image".to_vec(), None),
            Err(RetouchError::Validation(_))
        ));
    }

    #[test]
    fn test_load_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.png");
        std::fs::write(&path, sample_png(5, 5, [9, 9, 9, 255]).bytes()).unwrap();

        let (buffer, name) = ImageIntake::default().load_path(&path).unwrap();
        assert_eq!(name, "ring.png");
        assert_eq!(buffer.decode().unwrap().dimensions(), (5, 5));

        let missing = ImageIntake::default().load_path(dir.path().join("missing.png"));
        assert!(matches!(missing, Err(RetouchError::Io(_))));
    }
}
