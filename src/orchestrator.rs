//! Two-stage pipeline orchestrator
//!
//! Drives each [`ImageJob`] through remote content removal, publishing,
//! upscale submission and polling. Batches run in fixed-size groups: every
//! job in a group runs concurrently and the next group starts only once the
//! whole group has finished.

use crate::config::{ContinuationPolicy, PipelineConfig};
use crate::error::{Result, RetouchError};
use crate::job::{ImageJob, JobId, JobStatus};
use crate::registry::{JobRegistry, JobStatistics};
use crate::remote::{Collaborators, UpscaleRequest, UpscaleSubmission};
use crate::services::progress::{
    BatchProgressUpdate, NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{FocusPoint, ImageBuffer, RemoteJobTicket};
use futures::future::join_all;
use instant::Instant;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::tracing_config::{events, spans};
use tracing::{instrument, Instrument};

/// Message used when the upscaler reports `FAILED` without details
pub const UPSCALE_FAILED_FALLBACK: &str =
    "The upscale service reported that the upscaling process failed.";

/// Final state of one job after a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

/// Summary of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Size of each group, in execution order
    pub group_sizes: Vec<usize>,
    /// One outcome per scheduled job, in submission order
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(JobStatus::Completed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    /// Jobs paused for a refinement choice
    #[must_use]
    pub fn awaiting_choice(&self) -> usize {
        self.count(JobStatus::AwaitingChoice)
    }

    fn count(&self, status: JobStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Clears the batch flag when the batch future finishes or is dropped
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-session pipeline driver
///
/// The continuation policy is read from the configuration once and applies
/// to every job this orchestrator runs.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    collaborators: Collaborators,
    registry: JobRegistry,
    reporter: Arc<dyn ProgressReporter>,
    is_processing: AtomicBool,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("is_processing", &self.is_processing())
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Create an orchestrator with a validated configuration
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collaborators,
            registry: JobRegistry::new(),
            reporter: Arc::new(NoOpProgressReporter),
            is_processing: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Whether a batch is currently running
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    /// Register a validated source image as a pending job
    pub fn add_image(&self, source: ImageBuffer, name: impl Into<String>) -> Result<JobId> {
        let job = ImageJob::new(source, name);
        let id = self.registry.insert(job)?;
        self.report(id, PipelineStage::Queued, Instant::now());
        Ok(id)
    }

    pub fn add_images<I, S>(&self, images: I) -> Result<Vec<JobId>>
    where
        I: IntoIterator<Item = (ImageBuffer, S)>,
        S: Into<String>,
    {
        images
            .into_iter()
            .map(|(source, name)| self.add_image(source, name))
            .collect()
    }

    /// Snapshot of one job
    pub fn job(&self, id: JobId) -> Result<ImageJob> {
        self.registry.get(id)
    }

    /// Snapshot of every job in submission order
    pub fn jobs(&self) -> Result<Vec<ImageJob>> {
        self.registry.snapshot()
    }

    pub fn statistics(&self) -> Result<JobStatistics> {
        self.registry.statistics()
    }

    /// Remove a job that is not currently running, releasing its buffers
    ///
    /// The status check and the removal happen under one registry lock.
    pub fn remove_image(&self, id: JobId) -> Result<Option<ImageJob>> {
        self.registry.remove_if(id, |job| {
            if job.status().is_active() {
                return Err(RetouchError::processing(format!(
                    "Job {} is still {}",
                    id,
                    job.status()
                )));
            }
            Ok(())
        })
    }

    /// Remove every job; refused while a batch or any job is running
    pub fn clear_all(&self) -> Result<usize> {
        let removed = self.registry.clear_if(|stats| {
            if self.is_processing() || stats.running > 0 {
                return Err(RetouchError::processing(
                    "Cannot clear jobs while processing is in progress",
                ));
            }
            Ok(())
        })?;
        log::info!("🧹 Cleared {} jobs", removed);
        Ok(removed)
    }

    fn report(&self, id: JobId, stage: PipelineStage, started: Instant) {
        self.reporter
            .report_progress(ProgressUpdate::new(id, stage, started));
    }

    /// Record `error` on the job and hand it back for propagation
    fn fail_job(&self, id: JobId, stage: PipelineStage, error: RetouchError) -> RetouchError {
        if let Err(update_error) = self.registry.update(id, |job| job.fail(&error)) {
            log::warn!("Could not record failure for job {}: {}", id, update_error);
        }
        tracing::error!(
            job = %id,
            stage = stage.description(),
            error_kind = ?error.kind(),
            error = %error,
            "job failed"
        );
        self.reporter.report_job_failed(id, stage, &error.to_string());
        error
    }

    /// Run a pending job through Stage 1 and, under auto-continue, Stage 2
    ///
    /// Returns the job's status afterwards: `Completed`, or `AwaitingChoice`
    /// when the orchestrator pauses for refinement. Remote failures are
    /// recorded on the job before the error is returned.
    #[instrument(skip(self, id), fields(job = %id))]
    pub async fn submit(&self, id: JobId, hotspot: Option<FocusPoint>) -> Result<JobStatus> {
        let started = Instant::now();
        match self.stage1(id, hotspot, started).await? {
            Some(intermediate) => {
                self.stage2(id, intermediate, started).await?;
                Ok(JobStatus::Completed)
            },
            None => Ok(JobStatus::AwaitingChoice),
        }
    }

    /// Resume a job paused in `AwaitingChoice`
    ///
    /// `refined` replaces the Stage-1 result as the image sent to Stage 2
    /// when the user refined it locally.
    #[instrument(skip(self, id, refined), fields(job = %id, refined = refined.is_some()))]
    pub async fn continue_job(&self, id: JobId, refined: Option<ImageBuffer>) -> Result<()> {
        let started = Instant::now();
        let stage1 = self.registry.update(id, |job| {
            job.resume_stage2()?;
            job.stage1_result()
                .cloned()
                .ok_or_else(|| RetouchError::internal("Job has no Stage 1 result"))
        })?;
        self.stage2(id, refined.unwrap_or(stage1), started).await
    }

    /// Stage 1; yields the intermediate when Stage 2 should follow directly
    async fn stage1(
        &self,
        id: JobId,
        hotspot: Option<FocusPoint>,
        started: Instant,
    ) -> Result<Option<ImageBuffer>> {
        let source = self.registry.update(id, |job| {
            job.begin_stage1()?;
            Ok(job.source().clone())
        })?;
        self.report(id, PipelineStage::ContentRemoval, started);

        let focus = hotspot.unwrap_or(self.config.default_hotspot);
        log::info!("🎯 Removing content from job {} around ({}, {})", id, focus.x, focus.y);

        let result = self
            .collaborators
            .remover
            .remove_content(&source, focus, &self.config.removal_prompt)
            .instrument(spans::stage("content_removal"))
            .await
            .map_err(|e| self.fail_job(id, PipelineStage::ContentRemoval, e))?;

        let pause = self.config.continuation == ContinuationPolicy::AwaitChoice;
        self.registry
            .update(id, |job| job.finish_stage1(result.clone(), pause))
            .map_err(|e| self.fail_job(id, PipelineStage::ContentRemoval, e))?;

        if pause {
            self.report(id, PipelineStage::AwaitingChoice, started);
            log::info!("⏸️  Job {} is waiting for a refinement choice", id);
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }

    async fn stage2(&self, id: JobId, intermediate: ImageBuffer, started: Instant) -> Result<()> {
        self.report(id, PipelineStage::Publishing, started);
        let public_url = self
            .publish_intermediate(&intermediate)
            .await
            .map_err(|e| self.fail_job(id, PipelineStage::Publishing, e))?;
        self.registry
            .update(id, |job| job.record_published(public_url.clone()))
            .map_err(|e| self.fail_job(id, PipelineStage::Publishing, e))?;

        self.report(id, PipelineStage::UpscaleSubmission, started);
        let ticket = self
            .run_stage2(&public_url)
            .await
            .map_err(|e| self.fail_job(id, PipelineStage::UpscaleSubmission, e))?;

        self.report(id, PipelineStage::Polling, started);
        let result_url = self
            .poll(ticket, Some((id, started)))
            .await
            .map_err(|e| self.fail_job(id, PipelineStage::Polling, e))?;

        self.report(id, PipelineStage::Downloading, started);
        let upscaled = self
            .collaborators
            .fetcher
            .fetch(&result_url)
            .await
            .map_err(|e| self.fail_job(id, PipelineStage::Downloading, e))?;

        self.registry
            .update(id, |job| job.complete(result_url.clone(), upscaled))
            .map_err(|e| self.fail_job(id, PipelineStage::Downloading, e))?;
        self.report(id, PipelineStage::Completed, started);
        events::stage_completed("upscale", started.elapsed().as_millis() as u64);
        log::info!("✅ Job {} completed: {}", id, result_url);
        Ok(())
    }

    /// Upload an intermediate image and return its public URL
    #[instrument(skip_all, fields(bytes = buffer.len()))]
    pub async fn publish_intermediate(&self, buffer: &ImageBuffer) -> Result<String> {
        let response = self.collaborators.host.publish(buffer).await?;
        if !response.success {
            return Err(RetouchError::publish_failed(
                "The image host reported an unsuccessful upload",
            ));
        }
        let url = response
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| RetouchError::publish_failed("The image host returned no URL"))?;
        log::debug!("Published intermediate to {}", url);
        Ok(url)
    }

    /// Submit an upscale job for a public image URL
    #[instrument(skip(self))]
    pub async fn run_stage2(&self, public_url: &str) -> Result<RemoteJobTicket> {
        let request = UpscaleRequest {
            source_url: public_url.to_string(),
            mode: self.config.upscale_mode.clone(),
            callback_url: self.config.callback_url.clone(),
        };
        let UpscaleSubmission {
            success,
            request_id,
            error,
        } = self.collaborators.upscaler.submit(&request).await?;

        let reason = || error.clone().filter(|e| !e.trim().is_empty());
        if !success {
            return Err(RetouchError::submission_failed(
                reason().unwrap_or_else(|| "The upscale service rejected the job".to_string()),
            ));
        }
        let request_id = request_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                RetouchError::submission_failed(
                    reason().unwrap_or_else(|| "The upscale service returned no request id".to_string()),
                )
            })?;

        log::info!("📤 Upscale job submitted: {}", request_id);
        Ok(RemoteJobTicket::new(request_id))
    }

    /// Poll an upscale job until it completes, fails or the attempt budget runs out
    ///
    /// Transport failures are logged and retried. An explicit `FAILED` status
    /// ends polling immediately.
    pub async fn poll_until_done(&self, ticket: RemoteJobTicket) -> Result<String> {
        self.poll(ticket, None).await
    }

    async fn poll(&self, ticket: RemoteJobTicket, job: Option<(JobId, Instant)>) -> Result<String> {
        let polling = self.config.polling;
        let span = spans::poll(&ticket.task_id, polling.max_attempts);

        async move {
            let mut last_response: Option<serde_json::Value> = None;

            for attempt in 1..=polling.max_attempts {
                tokio::time::sleep(polling.interval()).await;

                if let Some((id, started)) = job {
                    self.reporter.report_progress(ProgressUpdate::with_description(
                        id,
                        PipelineStage::Polling,
                        format!(
                            "Waiting for upscaler (attempt {}/{})",
                            attempt, polling.max_attempts
                        ),
                        started,
                    ));
                }

                let status = match self.collaborators.upscaler.status(&ticket.task_id).await {
                    Ok(status) => status,
                    Err(e) => {
                        events::poll_attempt(&ticket.task_id, attempt, polling.max_attempts, None);
                        log::warn!("Status check for {} failed: {}", ticket.task_id, e);
                        continue;
                    },
                };

                let normalized = status.normalized_status();
                log::debug!(
                    "Status check {}/{} for {}: {}",
                    attempt,
                    polling.max_attempts,
                    ticket.task_id,
                    status.raw
                );
                events::poll_attempt(
                    &ticket.task_id,
                    attempt,
                    polling.max_attempts,
                    Some(&normalized),
                );

                match normalized.as_str() {
                    "COMPLETED" => {
                        if let Some(url) = status.final_url() {
                            log::info!(
                                "✨ Upscale {} completed after {} attempts",
                                ticket.task_id,
                                attempt
                            );
                            return Ok(url.to_string());
                        }
                    },
                    "FAILED" => {
                        let message = status
                            .error
                            .filter(|e| !e.trim().is_empty())
                            .unwrap_or_else(|| UPSCALE_FAILED_FALLBACK.to_string());
                        return Err(RetouchError::upscale_failed(message));
                    },
                    _ => {},
                }
                last_response = Some(status.raw);
            }

            Err(RetouchError::PollingTimeout {
                attempts: polling.max_attempts,
                last_response: last_response
                    .map_or_else(|| "null".to_string(), |raw| raw.to_string()),
            })
        }
        .instrument(span)
        .await
    }

    /// Run the given pending jobs in groups of `batch_concurrency`
    ///
    /// Job failures are recorded per job and never abort the batch. Ids that
    /// are unknown or not pending are skipped. Fails only when another batch
    /// is already running.
    #[instrument(skip_all, fields(jobs = ids.len()))]
    pub async fn process_batch(&self, ids: &[JobId]) -> Result<BatchReport> {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RetouchError::processing("A batch is already being processed"));
        }
        let _guard = ProcessingGuard(&self.is_processing);

        let mut seen = HashSet::new();
        let scheduled: Vec<JobId> = ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .filter(|id| match self.registry.get(*id) {
                Ok(job) if job.status() == JobStatus::Pending => true,
                Ok(job) => {
                    log::warn!("Skipping job {}: status is {}", id, job.status());
                    false
                },
                Err(e) => {
                    log::warn!("Skipping job {}: {}", id, e);
                    false
                },
            })
            .collect();

        let groups: Vec<&[JobId]> = scheduled.chunks(self.config.batch_concurrency).collect();
        let groups_total = groups.len();
        log::info!(
            "📦 Processing {} jobs in {} groups of up to {}",
            scheduled.len(),
            groups_total,
            self.config.batch_concurrency
        );

        let mut report = BatchReport::default();
        for (index, group) in groups.into_iter().enumerate() {
            let span = spans::batch_group(index + 1, group.len());
            let results = join_all(group.iter().map(|id| {
                self.submit(*id, None)
                    .instrument(spans::job(&id.to_string()))
            }))
                .instrument(span)
                .await;

            for (id, result) in group.iter().zip(results) {
                report.outcomes.push(self.outcome(*id, result));
            }
            report.group_sizes.push(group.len());

            self.reporter.report_batch_progress(BatchProgressUpdate {
                group: index + 1,
                groups_total,
                jobs_finished: report.total(),
                jobs_total: scheduled.len(),
                jobs_failed: report.failed(),
            });
        }

        log::info!(
            "🏁 Batch finished: {} completed, {} awaiting choice, {} failed",
            report.completed(),
            report.awaiting_choice(),
            report.failed()
        );
        Ok(report)
    }

    /// Run every job currently pending
    pub async fn process_pending(&self) -> Result<BatchReport> {
        let pending = self.registry.ids_with_status(JobStatus::Pending)?;
        self.process_batch(&pending).await
    }

    fn outcome(&self, id: JobId, result: Result<JobStatus>) -> JobOutcome {
        match self.registry.get(id) {
            Ok(job) => JobOutcome {
                id,
                name: job.original_name().to_string(),
                status: job.status(),
                error: job
                    .error_detail()
                    .map(str::to_owned)
                    .or_else(|| result.err().map(|e| e.to_string())),
            },
            Err(lookup) => JobOutcome {
                id,
                name: String::new(),
                status: JobStatus::Failed,
                error: Some(result.err().unwrap_or(lookup).to_string()),
            },
        }
    }
}
