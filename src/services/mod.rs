//! Service layer for intake, export and progress concerns
//!
//! These services keep file handling and user-facing reporting out of the
//! pipeline and compositing code.

pub mod format;
pub mod io;
pub mod progress;

pub use format::{flatten_on_white, write_buffer, ExportFormat, JPEG_QUALITY};
pub use io::{ImageIntake, ACCEPTED_MIME_TYPES, MAX_INPUT_BYTES};
pub use progress::{
    BatchProgressUpdate, ConsoleProgressReporter, NoOpProgressReporter, PipelineStage,
    ProgressReporter, ProgressUpdate,
};
