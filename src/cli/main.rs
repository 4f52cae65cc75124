//! Retouch CLI
//!
//! Runs the remote two-stage pipeline over local files and exposes the local
//! crop and compositing operations.

use super::config::CliConfigBuilder;
use super::progress::create_cli_progress_reporter;
use crate::{
    compositing::{extract_square, replace, MaskCompositor, MaskExtent, MaskStrokes},
    config::Credentials,
    job::{ImageJob, JobStatus},
    orchestrator::PipelineOrchestrator,
    remote::http,
    services::{write_buffer, ExportFormat, ImageIntake},
    tracing_config::{events, init_cli_tracing, spans, TracingFormat},
    types::{CropRegion, FocusPoint, ImageBuffer, MimeType},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::RgbaImage;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Instrument;

/// Two-stage image retouching pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "retouch")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Plain uncolored log output (for CI logs)
    #[arg(long, global = true)]
    pub compact_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send images through content removal and upscaling
    Process(ProcessArgs),
    /// Extract a square crop around a point
    Crop(CropArgs),
    /// Composite a replacement into a region of a base image
    Composite(CompositeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Input images (JPEG, PNG or WebP, up to 10 MB each)
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Focus point for content removal, as X,Y
    #[arg(long, value_name = "X,Y")]
    pub hotspot: Option<FocusPoint>,

    /// What happens after content removal
    #[arg(long, value_enum)]
    pub policy: Option<CliPolicy>,

    /// Pipeline configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Jobs processed concurrently per group
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Log every progress update instead of showing a progress bar
    #[arg(long)]
    pub progress: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliPolicy {
    /// Publish and upscale right after content removal
    Auto,
    /// Stop after content removal and keep the intermediate
    Await,
}

#[derive(Args, Debug, Clone)]
pub struct CropArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Crop center, as X,Y
    #[arg(long, value_name = "X,Y")]
    pub center: FocusPoint,

    /// Side length of the square output
    #[arg(long, default_value_t = crate::compositing::DEFAULT_CROP_SIZE)]
    pub size: u32,

    /// Output file; format follows the extension
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CompositeArgs {
    /// Full-resolution base image
    #[arg(long, value_name = "FILE")]
    pub base: PathBuf,

    /// Replacement pixels, sized like the region
    #[arg(long, value_name = "FILE")]
    pub replacement: PathBuf,

    /// Target region in base-image pixels, as X,Y,W,H
    #[arg(long, value_name = "X,Y,W,H")]
    pub region: CropRegion,

    /// Painted mask (alpha or luminance marks generated content to keep)
    #[arg(long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Surface the mask was painted over: crop or image
    #[arg(long, default_value = "crop")]
    pub mask_extent: MaskExtent,

    /// Feathering blur sigma in pixels
    #[arg(long, default_value_t = crate::compositing::DEFAULT_FEATHER_SIGMA)]
    pub sigma: f32,

    /// Output file; format follows the extension
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.compact_logs {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };
    let session_id = init_cli_tracing(cli.verbose, format).context("Failed to initialize tracing")?;

    match cli.command {
        Command::Process(args) => {
            let span = spans::session(&session_id, "process");
            process(&args, cli.verbose).instrument(span).await
        },
        Command::Crop(args) => crop(&args),
        Command::Composite(args) => composite(&args),
    }
}

/// Run the pipeline over every input; job failures are reported, not raised
async fn process(args: &ProcessArgs, verbose: u8) -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {},
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    let config = CliConfigBuilder::from_args(args).context("Failed to build configuration")?;
    let credentials = Credentials::from_env().context("Missing API credentials")?;
    let collaborators =
        http::collaborators(&config, &credentials).context("Failed to create service clients")?;

    info!(
        "Policy: {}, concurrency: {}, hotspot: ({}, {})",
        config.continuation,
        config.batch_concurrency,
        config.default_hotspot.x,
        config.default_hotspot.y
    );

    std::fs::create_dir_all(&args.output).with_context(|| {
        format!("Failed to create output directory: {}", args.output.display())
    })?;

    let intake = ImageIntake::default();
    let mut sources = Vec::new();
    for input in &args.inputs {
        if !ImageIntake::is_supported_extension(input) {
            warn!("Skipping unsupported file: {}", input.display());
            continue;
        }
        match intake.load_path(input) {
            Ok(source) => sources.push(source),
            Err(e) => events::error_with_context(&e, &format!("loading {}", input.display())),
        }
    }
    if sources.is_empty() {
        anyhow::bail!("No valid input images");
    }
    events::progress(&format!("Loaded {} images", sources.len()), "📥");

    let reporter = create_cli_progress_reporter(args.progress, verbose > 0, sources.len());
    let orchestrator = PipelineOrchestrator::new(config, collaborators)
        .context("Invalid configuration")?
        .with_progress_reporter(reporter);
    let ids = orchestrator.add_images(sources)?;

    let started = Instant::now();
    let report = orchestrator
        .process_batch(&ids)
        .instrument(spans::batch(ids.len(), orchestrator.config().batch_concurrency))
        .await?;

    for job in orchestrator.jobs()? {
        if let Err(e) = write_job_outputs(&job, &args.output) {
            warn!("Could not write outputs for {}: {:#}", job.original_name(), e);
        }
        match job.status() {
            JobStatus::Completed => info!(
                "✅ {} -> {}",
                job.original_name(),
                job.result_url().unwrap_or_default()
            ),
            JobStatus::AwaitingChoice => info!("⏸️  {} awaiting refinement", job.original_name()),
            JobStatus::Failed => warn!(
                "❌ {}: {}",
                job.original_name(),
                job.error_detail().unwrap_or("unknown error")
            ),
            other => warn!("{} ended as {}", job.original_name(), other),
        }
    }

    info!("📊 Batch summary:");
    info!("  ├─ Completed: {}", report.completed());
    info!("  ├─ Awaiting choice: {}", report.awaiting_choice());
    info!("  ├─ Failed: {}", report.failed());
    info!("  └─ Total time: {:.2}s", started.elapsed().as_secs_f64());
    Ok(())
}

fn extension_for(mime: MimeType) -> &'static str {
    match mime {
        MimeType::Jpeg => "jpg",
        MimeType::Png => "png",
        MimeType::WebP => "webp",
    }
}

/// `<dir>/<stem>_<suffix>.<ext>`
fn output_path(dir: &Path, original_name: &str, suffix: &str, mime: MimeType) -> PathBuf {
    let stem = Path::new(original_name)
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    dir.join(format!("{}_{}.{}", stem, suffix, extension_for(mime)))
}

fn write_job_outputs(job: &ImageJob, dir: &Path) -> Result<()> {
    let outputs: [(&str, Option<&ImageBuffer>); 2] = [
        ("stage1", job.stage1_result()),
        ("upscaled", job.stage2_result()),
    ];
    for (suffix, buffer) in outputs {
        if let Some(buffer) = buffer {
            let path = output_path(dir, job.original_name(), suffix, buffer.mime());
            write_buffer(buffer, &path)?;
            log::debug!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn load_rgba(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)
        .with_context(|| format!("Failed to load image: {}", path.display()))?
        .to_rgba8())
}

fn export_format_for(path: &Path) -> ExportFormat {
    ExportFormat::from_path(path).unwrap_or_else(|| {
        warn!("Unknown output extension for {}, writing PNG", path.display());
        ExportFormat::Png
    })
}

fn crop(args: &CropArgs) -> Result<()> {
    let (source, _) = ImageIntake::default()
        .load_path(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let image = source.decode()?;

    let crop = extract_square(&image, args.center, args.size)?;
    export_format_for(&args.output).save(&crop.canvas, &args.output)?;

    println!("✂️  Cropped {} -> {}", crop.region, args.output.display());
    if crop.is_padded() {
        println!(
            "   Image smaller than {}px; padded with white at ({}, {})",
            args.size, crop.placement.0, crop.placement.1
        );
    }
    Ok(())
}

fn composite(args: &CompositeArgs) -> Result<()> {
    let base = load_rgba(&args.base)?;
    let replacement = load_rgba(&args.replacement)?;

    let output = match &args.mask {
        Some(mask_path) => {
            let layer = image::open(mask_path)
                .with_context(|| format!("Failed to load mask: {}", mask_path.display()))?;
            let strokes = if layer.color().has_alpha() {
                MaskStrokes::from_alpha(&layer.to_rgba8(), args.mask_extent)
            } else {
                MaskStrokes::new(layer.to_luma8(), args.mask_extent)
            };
            MaskCompositor::new(args.sigma)
                .blend(&base, &replacement, &strokes, args.region)
                .context("Mask blend failed")?
        },
        None => replace(&base, &replacement, args.region).context("Replacement failed")?,
    };

    export_format_for(&args.output).save(&output, &args.output)?;
    println!("🎨 Composited {} -> {}", args.region, args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_utils::sample_png;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_process() {
        let cli = Cli::parse_from([
            "retouch", "-v", "process", "a.jpg", "b.png", "--hotspot", "120,340", "--policy",
            "await", "-o", "out",
        ]);
        assert_eq!(cli.verbose, 1);
        let Command::Process(args) = cli.command else {
            panic!("expected process");
        };
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.hotspot, Some(FocusPoint::new(120, 340)));
        assert_eq!(args.policy, Some(CliPolicy::Await));
        assert_eq!(args.output, PathBuf::from("out"));
    }

    #[test]
    fn test_parse_composite() {
        let cli = Cli::parse_from([
            "retouch",
            "composite",
            "--base",
            "base.png",
            "--replacement",
            "patch.png",
            "--region",
            "10,20,64,64",
            "--mask-extent",
            "image",
            "-o",
            "out.png",
        ]);
        let Command::Composite(args) = cli.command else {
            panic!("expected composite");
        };
        assert_eq!(args.region, CropRegion::new(10, 20, 64, 64));
        assert_eq!(args.mask_extent, MaskExtent::FullImage);
        assert!((args.sigma - 15.0).abs() < f32::EPSILON);
        assert!(args.mask.is_none());
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("out"), "ring.jpeg", "upscaled", MimeType::Png);
        assert_eq!(path, PathBuf::from("out/ring_upscaled.png"));
    }

    #[test]
    fn test_crop_and_composite_commands() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.png");
        let patch = dir.path().join("patch.png");
        std::fs::write(&base, sample_png(32, 32, [0, 0, 0, 255]).bytes()).unwrap();
        std::fs::write(&patch, sample_png(8, 8, [255, 255, 255, 255]).bytes()).unwrap();

        let cropped = dir.path().join("crop.png");
        crop(&CropArgs {
            input: base.clone(),
            center: FocusPoint::new(16, 16),
            size: 8,
            output: cropped.clone(),
        })
        .unwrap();
        assert_eq!(load_rgba(&cropped).unwrap().dimensions(), (8, 8));

        let composited = dir.path().join("out.png");
        composite(&CompositeArgs {
            base,
            replacement: patch,
            region: CropRegion::new(4, 4, 8, 8),
            mask: None,
            mask_extent: MaskExtent::Crop,
            sigma: 15.0,
            output: composited.clone(),
        })
        .unwrap();
        let out = load_rgba(&composited).unwrap();
        assert_eq!(out.get_pixel(4, 4)[0], 255);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
    }
}
