//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.

use crate::job::{checkpoints, JobId};
use instant::Instant;

/// Pipeline stages a job moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Registered, not yet started
    Queued,
    /// Stage 1: remote content removal
    ContentRemoval,
    /// Stage 1 finished, waiting for the user
    AwaitingChoice,
    /// Uploading the intermediate to the public host
    Publishing,
    /// Submitting the upscale job
    UpscaleSubmission,
    /// Waiting for the upscale job to finish
    Polling,
    /// Fetching the upscaled result
    Downloading,
    /// Processing completed
    Completed,
    /// Processing failed
    Failed,
}

impl PipelineStage {
    /// Get a human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Queued => "Queued",
            PipelineStage::ContentRemoval => "Removing content",
            PipelineStage::AwaitingChoice => "Waiting for refinement choice",
            PipelineStage::Publishing => "Publishing intermediate image",
            PipelineStage::UpscaleSubmission => "Submitting upscale job",
            PipelineStage::Polling => "Waiting for upscaler",
            PipelineStage::Downloading => "Downloading result",
            PipelineStage::Completed => "Processing completed",
            PipelineStage::Failed => "Processing failed",
        }
    }

    /// Job progress once this stage has been reached
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            PipelineStage::Queued | PipelineStage::Failed => 0,
            PipelineStage::ContentRemoval => checkpoints::SUBMITTED,
            PipelineStage::AwaitingChoice | PipelineStage::Publishing => checkpoints::STAGE1_DONE,
            PipelineStage::UpscaleSubmission
            | PipelineStage::Polling
            | PipelineStage::Downloading => checkpoints::PUBLISHED,
            PipelineStage::Completed => checkpoints::COMPLETED,
        }
    }
}

/// Progress update for one job
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Job the update refers to
    pub job_id: JobId,
    /// Current stage
    pub stage: PipelineStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since the job started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(job_id: JobId, stage: PipelineStage, start_time: Instant) -> Self {
        Self {
            job_id,
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Create a progress update with custom description
    #[must_use]
    pub fn with_description(
        job_id: JobId,
        stage: PipelineStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            description,
            ..Self::new(job_id, stage, start_time)
        }
    }
}

/// Batch-level progress after a group finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgressUpdate {
    /// 1-based index of the group that just finished
    pub group: usize,
    /// Number of groups in the batch
    pub groups_total: usize,
    /// Jobs finished so far (any outcome)
    pub jobs_finished: usize,
    /// Jobs in the batch
    pub jobs_total: usize,
    /// Jobs that failed so far
    pub jobs_failed: usize,
}

impl BatchProgressUpdate {
    /// Overall batch completion percentage
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if self.jobs_total == 0 {
            return 100;
        }
        ((self.jobs_finished * 100) / self.jobs_total).min(100) as u8
    }
}

/// Trait for reporting progress during pipeline runs
pub trait ProgressReporter: Send + Sync {
    /// Report a job progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report a job failure with its user-visible detail
    fn report_job_failed(&self, job_id: JobId, stage: PipelineStage, error: &str);

    /// Report batch progress after each group
    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        // Default implementation does nothing
        drop(update);
    }
}

/// Reporter that ignores every update
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_job_failed(&self, _job_id: JobId, _stage: PipelineStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// `verbose` adds the job id and elapsed time to every line
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}] [{}%] {} ({}ms elapsed)",
                update.job_id,
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_job_failed(&self, job_id: JobId, stage: PipelineStage, error: &str) {
        log::error!("❌ Job {} failed during {}: {}", job_id, stage.description(), error);
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        log::info!(
            "📦 Group {}/{} done: {}/{} jobs finished ({} failed)",
            update.group,
            update.groups_total,
            update.jobs_finished,
            update.jobs_total,
            update.jobs_failed
        );
    }
}
