//! Per-image job record and its status state machine

use crate::error::{ErrorKind, Result, RetouchError};
use crate::types::ImageBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress checkpoints reported by the pipeline
pub mod checkpoints {
    pub const SUBMITTED: u8 = 10;
    pub const STAGE1_DONE: u8 = 50;
    pub const PUBLISHED: u8 = 75;
    pub const COMPLETED: u8 = 100;
}

/// Opaque job identifier, stable for the job's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(uuid::Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing status of an [`ImageJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Stage1Running,
    AwaitingChoice,
    Stage2Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the status is final
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a remote stage is currently running
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Stage1Running | Self::Stage2Running)
    }

    /// Legal forward transitions. `Failed` is reachable from every
    /// non-terminal status; nothing leaves a terminal status.
    #[must_use]
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::{AwaitingChoice, Completed, Failed, Pending, Stage1Running, Stage2Running};

        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Pending, Stage1Running)
            | (Stage1Running, AwaitingChoice | Stage2Running)
            | (AwaitingChoice, Stage2Running)
            | (Stage2Running, Completed) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Stage1Running => "removing content",
            Self::AwaitingChoice => "awaiting choice",
            Self::Stage2Running => "upscaling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure details attached to a failed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

/// One submitted image's end-to-end processing record
#[derive(Debug, Clone)]
pub struct ImageJob {
    id: JobId,
    source: ImageBuffer,
    original_name: String,
    created_at: DateTime<Utc>,
    status: JobStatus,
    progress: u8,
    stage1_result: Option<ImageBuffer>,
    intermediate_url: Option<String>,
    result_url: Option<String>,
    stage2_result: Option<ImageBuffer>,
    failure: Option<JobFailure>,
}

impl ImageJob {
    /// Create a pending job for a validated source buffer
    #[must_use]
    pub fn new(source: ImageBuffer, original_name: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            source,
            original_name: original_name.into(),
            created_at: Utc::now(),
            status: JobStatus::Pending,
            progress: 0,
            stage1_result: None,
            intermediate_url: None,
            result_url: None,
            stage2_result: None,
            failure: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn source(&self) -> &ImageBuffer {
        &self.source
    }

    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    #[must_use]
    pub fn stage1_result(&self) -> Option<&ImageBuffer> {
        self.stage1_result.as_ref()
    }

    #[must_use]
    pub fn stage2_result(&self) -> Option<&ImageBuffer> {
        self.stage2_result.as_ref()
    }

    /// Public URL of the published intermediate
    #[must_use]
    pub fn intermediate_url(&self) -> Option<&str> {
        self.intermediate_url.as_deref()
    }

    /// URL the upscale service reported for the final result
    #[must_use]
    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    /// User-visible failure text
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.detail.as_str())
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RetouchError::InvalidTransition {
                from: self.status.label().to_string(),
                to: next.label().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    fn advance_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(checkpoints::COMPLETED));
    }

    /// `Pending -> Stage1Running`
    pub fn begin_stage1(&mut self) -> Result<()> {
        self.transition(JobStatus::Stage1Running)?;
        self.advance_progress(checkpoints::SUBMITTED);
        Ok(())
    }

    /// Record the Stage-1 result and move on according to `pause`:
    /// `AwaitingChoice` when pausing, otherwise straight to `Stage2Running`.
    pub fn finish_stage1(&mut self, result: ImageBuffer, pause: bool) -> Result<()> {
        if self.status != JobStatus::Stage1Running {
            return Err(RetouchError::InvalidTransition {
                from: self.status.label().to_string(),
                to: "stage 1 result".to_string(),
            });
        }
        if self.stage1_result.is_some() {
            return Err(RetouchError::internal("Stage 1 result already recorded"));
        }
        let next = if pause {
            JobStatus::AwaitingChoice
        } else {
            JobStatus::Stage2Running
        };
        self.transition(next)?;
        self.stage1_result = Some(result);
        self.advance_progress(checkpoints::STAGE1_DONE);
        Ok(())
    }

    /// `AwaitingChoice -> Stage2Running`
    pub fn resume_stage2(&mut self) -> Result<()> {
        if self.status != JobStatus::AwaitingChoice {
            return Err(RetouchError::InvalidTransition {
                from: self.status.label().to_string(),
                to: JobStatus::Stage2Running.label().to_string(),
            });
        }
        self.transition(JobStatus::Stage2Running)
    }

    /// Record the public URL of the intermediate (Stage 2 only)
    pub fn record_published(&mut self, url: String) -> Result<()> {
        if self.status != JobStatus::Stage2Running {
            return Err(RetouchError::InvalidTransition {
                from: self.status.label().to_string(),
                to: "published".to_string(),
            });
        }
        self.intermediate_url = Some(url);
        self.advance_progress(checkpoints::PUBLISHED);
        Ok(())
    }

    /// `Stage2Running -> Completed`
    pub fn complete(&mut self, result_url: String, result: ImageBuffer) -> Result<()> {
        if self.stage2_result.is_some() {
            return Err(RetouchError::internal("Stage 2 result already recorded"));
        }
        self.transition(JobStatus::Completed)?;
        self.result_url = Some(result_url);
        self.stage2_result = Some(result);
        self.advance_progress(checkpoints::COMPLETED);
        Ok(())
    }

    /// Any non-terminal status `-> Failed`; progress resets to 0
    pub fn fail(&mut self, error: &RetouchError) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.progress = 0;
        self.failure = Some(JobFailure {
            kind: error.kind(),
            detail: error.to_string(),
        });
        Ok(())
    }
}
