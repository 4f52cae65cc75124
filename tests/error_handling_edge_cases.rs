//! Error conditions and boundary cases
//!
//! Intake validation, configuration limits, the job state machine and the
//! error classification surfaced on failed jobs.

use image::{Rgba, RgbaImage};
use retouch_pipeline::remote::test_utils::{sample_png, MockCollaborators};
use retouch_pipeline::services::ImageIntake;
use retouch_pipeline::{
    ErrorKind, ImageJob, JobRegistry, JobStatus, PipelineConfig, PipelineOrchestrator,
    RefinementSession, RetouchError, Result,
};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_intake_rejects_empty_and_oversized_input() {
    let intake = ImageIntake::new(64);

    let err = intake.accept_bytes(Vec::new(), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = intake.accept_bytes(vec![0u8; 65], None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("64 byte limit"));
}

#[test]
fn test_intake_rejects_unsupported_types() {
    let intake = ImageIntake::default();
    let png = sample_png(2, 2, [0, 0, 0, 255]).bytes().to_vec();

    let err = intake.accept_bytes(png, Some("image/gif")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("image/gif"));

    let err = intake
        .accept_bytes(b"GIF89a not really an image".to_vec(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_intake_rejects_truncated_image() {
    let mut png = sample_png(16, 16, [9, 9, 9, 255]).bytes().to_vec();
    png.truncate(png.len() / 2);

    let err = ImageIntake::default().accept_bytes(png, Some("image/png")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("could not be decoded"));
}

#[test]
fn test_intake_load_path_errors() -> Result<()> {
    let dir = TempDir::new()?;

    let err = ImageIntake::default()
        .load_path(dir.path().join("missing.png"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);

    let large = dir.path().join("large.png");
    std::fs::write(&large, vec![0u8; 128])?;
    let err = ImageIntake::new(100).load_path(&large).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[test]
fn test_config_boundaries() {
    assert!(PipelineConfig::builder().batch_concurrency(1).build().is_ok());

    let err = PipelineConfig::builder()
        .batch_concurrency(0)
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert!(err.to_string().contains("batch_concurrency"));

    assert!(PipelineConfig::builder()
        .polling(Duration::from_secs(2), 0)
        .build()
        .is_err());
    assert!(PipelineConfig::builder()
        .polling(Duration::ZERO, 60)
        .build()
        .is_err());
    assert!(PipelineConfig::builder().feather_sigma(-1.0).build().is_err());
    assert!(PipelineConfig::builder()
        .feather_sigma(f32::NAN)
        .build()
        .is_err());
    assert!(PipelineConfig::builder().upscale_mode("  ").build().is_err());
}

#[test]
fn test_orchestrator_rejects_invalid_config() {
    let mocks = MockCollaborators::happy_path();
    let config = PipelineConfig {
        batch_concurrency: 0,
        ..PipelineConfig::default()
    };
    let err = PipelineOrchestrator::new(config, mocks.collaborators()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn test_job_state_machine_rejects_illegal_moves() {
    let mut job = ImageJob::new(sample_png(2, 2, [1, 1, 1, 255]), "ring.png");

    // Cannot resume or publish before Stage 1
    assert_eq!(job.resume_stage2().unwrap_err().kind(), ErrorKind::InvalidTransition);
    assert!(job.record_published("https://host.test/1.png".into()).is_err());
    assert!(job
        .complete("https://cdn.test/x.png".into(), sample_png(2, 2, [0; 4]))
        .is_err());
    assert_eq!(job.status(), JobStatus::Pending);

    job.begin_stage1().unwrap();
    assert!(job.begin_stage1().is_err());

    job.fail(&RetouchError::content_policy("refused")).unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.progress(), 0);

    // Nothing leaves a terminal status
    assert!(job.fail(&RetouchError::internal("again")).is_err());
    assert!(job.begin_stage1().is_err());
    assert_eq!(job.failure().unwrap().kind, ErrorKind::ContentPolicy);
}

#[test]
fn test_status_transition_table() {
    use JobStatus::*;

    let all = [Pending, Stage1Running, AwaitingChoice, Stage2Running, Completed, Failed];
    for status in all {
        assert_eq!(status.can_transition_to(Failed), !status.is_terminal());
        assert!(!status.can_transition_to(Pending));
    }
    assert!(Stage1Running.can_transition_to(AwaitingChoice));
    assert!(Stage1Running.can_transition_to(Stage2Running));
    assert!(!Pending.can_transition_to(Stage2Running));
    assert!(!AwaitingChoice.can_transition_to(Completed));
    assert!(!Completed.can_transition_to(Stage2Running));
}

#[test]
fn test_registry_unknown_job() {
    let registry = JobRegistry::new();
    let stray = ImageJob::new(sample_png(1, 1, [0; 4]), "stray.png").id();

    assert_eq!(registry.get(stray).unwrap_err().kind(), ErrorKind::JobNotFound);
    assert!(registry.update(stray, |job| job.begin_stage1()).is_err());
    assert!(registry.remove(stray).unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_job_cannot_be_submitted() {
    let mocks = MockCollaborators::happy_path();
    let orchestrator =
        PipelineOrchestrator::new(PipelineConfig::default(), mocks.collaborators()).unwrap();
    let stray = ImageJob::new(sample_png(1, 1, [0; 4]), "stray.png").id();

    let err = orchestrator.submit(stray, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::JobNotFound);
    assert_eq!(mocks.remover.call_count(), 0);

    // Unknown ids are skipped by batches rather than failing them
    let report = orchestrator.process_batch(&[stray]).await.unwrap();
    assert_eq!(report.total(), 0);
}

#[test]
fn test_refinement_without_selection() {
    let mut session = RefinementSession::new(RgbaImage::from_pixel(8, 8, Rgba([5, 5, 5, 255])))
        .unwrap();

    assert_eq!(session.crop_buffer().unwrap_err().kind(), ErrorKind::Processing);
    assert!(session
        .set_patch(&RgbaImage::from_pixel(8, 8, Rgba([0; 4])))
        .is_err());
    assert!(session.apply_replacement().is_err());
    assert_eq!(session.select(Default::default(), 0).unwrap_err().kind(), ErrorKind::Validation);
}

#[test]
fn test_error_kind_classification() {
    let cases = [
        (RetouchError::validation("x"), ErrorKind::Validation),
        (RetouchError::remote_call("upscale", "502"), ErrorKind::RemoteCall),
        (RetouchError::publish_failed("x"), ErrorKind::PublishFailed),
        (RetouchError::submission_failed("x"), ErrorKind::SubmissionFailed),
        (RetouchError::upscale_failed("x"), ErrorKind::UpscaleFailed),
        (RetouchError::dimension_mismatch("x"), ErrorKind::DimensionMismatch),
        (RetouchError::rendering_unavailable("x"), ErrorKind::RenderingUnavailable),
        (
            RetouchError::PollingTimeout {
                attempts: 60,
                last_response: "null".into(),
            },
            ErrorKind::PollingTimeout,
        ),
    ];
    for (error, kind) in cases {
        assert_eq!(error.kind(), kind, "{}", error);
    }
}
