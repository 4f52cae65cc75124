//! Local image compositing engine
//!
//! Three pure operations over RGBA pixel buffers:
//!
//! - [`extract_square`] cuts a square crop around a focus point, padding on
//!   white when the image is smaller than the requested size
//! - [`MaskCompositor::blend`] blends a replacement into the crop region
//!   through a feathered coverage mask
//! - [`replace`] hard-overwrites the region
//!
//! All drawing goes through the [`surface`] helpers.

pub mod crop;
pub mod mask;
pub mod replace;
pub mod surface;

pub use crop::{extract_square, ExtractedCrop, DEFAULT_CROP_SIZE};
pub use mask::{blend, MaskCompositor, MaskExtent, MaskStrokes, DEFAULT_FEATHER_SIGMA};
pub use replace::replace;
pub use surface::MAX_SURFACE_DIMENSION;
