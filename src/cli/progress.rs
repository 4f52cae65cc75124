//! Terminal progress reporters

use crate::job::JobId;
use crate::services::progress::{
    BatchProgressUpdate, ConsoleProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Progress bar over the jobs of one batch
pub(crate) struct BarProgressReporter {
    bar: ProgressBar,
}

impl BarProgressReporter {
    pub(crate) fn new(total_jobs: usize) -> Self {
        let bar = ProgressBar::new(total_jobs as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for BarProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if update.stage != PipelineStage::Queued {
            self.bar.set_message(update.description);
        }
    }

    fn report_job_failed(&self, job_id: JobId, stage: PipelineStage, error: &str) {
        self.bar
            .println(format!("❌ {} failed during {}: {}", job_id, stage.description(), error));
    }

    fn report_batch_progress(&self, update: BatchProgressUpdate) {
        self.bar.set_position(update.jobs_finished as u64);
        if update.group == update.groups_total {
            self.bar.finish_with_message(format!(
                "Done: {} finished, {} failed",
                update.jobs_finished, update.jobs_failed
            ));
        }
    }
}

/// Log lines with `--progress`, a progress bar otherwise
pub(crate) fn create_cli_progress_reporter(
    detailed: bool,
    verbose: bool,
    total_jobs: usize,
) -> Arc<dyn ProgressReporter> {
    if detailed || total_jobs <= 1 {
        Arc::new(ConsoleProgressReporter::new(verbose))
    } else {
        Arc::new(BarProgressReporter::new(total_jobs))
    }
}
