//! Core data types shared by the pipeline and the compositing engine

use crate::error::{Result, RetouchError};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;

/// Image MIME types accepted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MimeType {
    Jpeg,
    Png,
    WebP,
}

impl MimeType {
    /// MIME string as sent to remote services
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    /// Parse a MIME string (`image/jpeg`, `image/jpg`, `image/png`, `image/webp`)
    #[must_use]
    pub fn from_mime_str(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect the MIME type from the leading bytes of an encoded image
    #[must_use]
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    /// Matching `image` crate format
    #[must_use]
    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned, encoded image bytes plus their declared MIME type
///
/// The bytes are reference counted so job snapshots can be cloned out of the
/// registry without copying pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    data: Arc<Vec<u8>>,
    mime: MimeType,
}

impl ImageBuffer {
    /// Wrap encoded bytes with a declared MIME type
    #[must_use]
    pub fn new(data: Vec<u8>, mime: MimeType) -> Self {
        Self {
            data: Arc::new(data),
            mime,
        }
    }

    /// Wrap encoded bytes, sniffing the MIME type from the content
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mime = MimeType::sniff(&data).ok_or_else(|| {
            RetouchError::validation("Unrecognised image data (expected JPEG, PNG or WebP)")
        })?;
        Ok(Self::new(data, mime))
    }

    /// Decode a base64 payload as returned by remote services
    pub fn from_base64(payload: &str, mime: MimeType) -> Result<Self> {
        let data = STANDARD
            .decode(payload.trim())
            .map_err(|e| RetouchError::processing(format!("Invalid base64 image payload: {}", e)))?;
        Ok(Self::new(data, mime))
    }

    /// Encode an RGBA image as PNG
    pub fn encode_png(image: &RgbaImage) -> Result<Self> {
        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, ImageFormat::Png)?;
        Ok(Self::new(cursor.into_inner(), MimeType::Png))
    }

    /// Raw encoded bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn mime(&self) -> MimeType {
        self.mime
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base64 representation for inline JSON payloads
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.data.as_slice())
    }

    /// Decode into an RGBA pixel buffer
    pub fn decode(&self) -> Result<RgbaImage> {
        let image = image::load_from_memory_with_format(&self.data, self.mime.image_format())
            .or_else(|_| image::load_from_memory(&self.data))?;
        Ok(image.to_rgba8())
    }
}

/// Caller-supplied focus point for the content-removal edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub x: u32,
    pub y: u32,
}

impl FocusPoint {
    #[must_use]
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl Default for FocusPoint {
    fn default() -> Self {
        Self { x: 500, y: 500 }
    }
}

impl std::str::FromStr for FocusPoint {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| RetouchError::invalid_config(format!("Expected X,Y but got '{}'", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| RetouchError::invalid_config(format!("Invalid coordinate '{}': {}", v, e)))
        };
        Ok(Self::new(parse(x)?, parse(y)?))
    }
}

/// Pixel rectangle in source-image coordinates
///
/// Regions produced by [`crate::compositing::extract_square`] are square
/// whenever the source image is at least the requested size on both axes; a
/// padded crop reports the actual image footprint instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Exclusive right edge
    #[must_use]
    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    /// Whether the region lies entirely inside an image of the given size
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= u64::from(width) && self.bottom() <= u64::from(height)
    }

    /// Whether a pixel lies inside the region
    #[must_use]
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x
            && py >= self.y
            && u64::from(px) < self.right()
            && u64::from(py) < self.bottom()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Display for CropRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

impl std::str::FromStr for CropRegion {
    type Err = RetouchError;

    /// Parse `X,Y,W,H`
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|v| {
                v.trim().parse::<u32>().map_err(|e| {
                    RetouchError::invalid_config(format!("Invalid region component '{}': {}", v, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(RetouchError::invalid_config(format!(
                "Expected X,Y,W,H but got '{}'",
                s
            ))),
        }
    }
}

/// Handle to an in-flight remote upscale job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJobTicket {
    pub task_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl RemoteJobTicket {
    #[must_use]
    pub fn new(task_id: String) -> Self {
        Self {
            task_id,
            submitted_at: Utc::now(),
        }
    }
}
