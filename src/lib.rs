#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Retouch Pipeline
//!
//! A two-stage remote image retouching pipeline with a local compositing
//! engine.
//!
//! Each submitted image becomes an [`ImageJob`] that the
//! [`PipelineOrchestrator`] drives through:
//!
//! 1. **Content removal**: a generative edit service removes content around a
//!    focus point.
//! 2. **Upscaling**: the intermediate is published to a public image host,
//!    submitted to an asynchronous upscale service, and polled every two
//!    seconds (60 attempts) until it completes.
//!
//! Batches run in groups of three concurrent jobs. Failures stay with the job
//! that hit them and never abort the batch.
//!
//! Between the stages, or after them, a [`RefinementSession`] can crop a
//! square region, regenerate it, and composite the result back with a
//! feathered mask or a hard replacement.
//!
//! ## Features
//!
//! - **Explicit job state machine**: illegal transitions are rejected
//! - **Bounded concurrency**: fixed-size batch groups over a shared registry
//! - **Polling watcher**: retries transport failures, stops on explicit `FAILED`
//! - **Compositing engine**: square crop extraction, feathered mask blend, area replacement
//! - **Pluggable collaborators**: every remote service sits behind an async trait
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use retouch_pipeline::{
//!     remote::http, Credentials, ImageIntake, PipelineConfig, PipelineOrchestrator,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let credentials = Credentials::from_env()?;
//! let collaborators = http::collaborators(&config, &credentials)?;
//! let orchestrator = PipelineOrchestrator::new(config, collaborators)?;
//!
//! let (source, name) = ImageIntake::default().load_path("ring.jpg")?;
//! let id = orchestrator.add_image(source, name)?;
//!
//! let report = orchestrator.process_batch(&[id]).await?;
//! println!("{} completed, {} failed", report.completed(), report.failed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Local compositing
//!
//! ```rust
//! use image::{Rgba, RgbaImage};
//! use retouch_pipeline::compositing::{blend, extract_square, MaskExtent, MaskStrokes};
//! use retouch_pipeline::FocusPoint;
//!
//! # fn example() -> retouch_pipeline::Result<()> {
//! let base = RgbaImage::from_pixel(2000, 2000, Rgba([40, 40, 40, 255]));
//! let crop = extract_square(&base, FocusPoint::new(50, 50), 1024)?;
//! assert_eq!((crop.region.x, crop.region.y), (0, 0));
//!
//! let patch = RgbaImage::from_pixel(1024, 1024, Rgba([200, 200, 200, 255]));
//! let strokes = MaskStrokes::opaque(512, 512, MaskExtent::Crop)?;
//! let output = blend(&base, &patch, &strokes, crop.region)?;
//! assert_eq!(output.dimensions(), (2000, 2000));
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and `.env` loading
//! - `webp-support` (default): WebP decoding and export
//! - `tracing-json`: JSON log output for the CLI

#[cfg(feature = "cli")]
pub mod cli;
pub mod compositing;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod refine;
pub mod registry;
pub mod remote;
pub mod services;
pub mod tracing_config;
pub mod types;

// Public API exports
pub use compositing::{
    blend, extract_square, replace, ExtractedCrop, MaskCompositor, MaskExtent, MaskStrokes,
};
pub use config::{
    ContinuationPolicy, Credentials, PipelineConfig, PipelineConfigBuilder, PollingConfig,
    ServiceEndpoints,
};
pub use error::{ErrorKind, Result, RetouchError};
pub use job::{ImageJob, JobFailure, JobId, JobStatus};
pub use orchestrator::{BatchReport, JobOutcome, PipelineOrchestrator};
pub use refine::RefinementSession;
pub use registry::{JobRegistry, JobStatistics};
pub use remote::{
    Collaborators, ContentRemover, ImageHost, PatchGenerator, ResultFetcher, Upscaler,
};
pub use services::{
    ConsoleProgressReporter, ExportFormat, ImageIntake, NoOpProgressReporter, PipelineStage,
    ProgressReporter, ProgressUpdate,
};
pub use types::{CropRegion, FocusPoint, ImageBuffer, MimeType, RemoteJobTicket};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
