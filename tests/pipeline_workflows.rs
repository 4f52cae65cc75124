//! End-to-end orchestrator workflows against scripted collaborators
//!
//! Every test runs on a paused tokio clock so the 2-second polling cadence
//! and the artificial service delays cost no wall time.

use retouch_pipeline::remote::test_utils::{
    sample_png, MockCollaborators, MockContentRemover, MockImageHost, MockUpscaler,
};
use retouch_pipeline::remote::{PublishResponse, UpscaleSubmission};
use retouch_pipeline::{
    ContinuationPolicy, ErrorKind, JobStatus, PipelineConfig, PipelineOrchestrator,
    RemoteJobTicket, RetouchError,
};
use std::time::Duration;

const FINAL_URL: &str = "https://cdn.test/final.png";

fn orchestrator(mocks: &MockCollaborators) -> PipelineOrchestrator {
    PipelineOrchestrator::new(PipelineConfig::default(), mocks.collaborators()).unwrap()
}

fn orchestrator_with(mocks: &MockCollaborators, config: PipelineConfig) -> PipelineOrchestrator {
    PipelineOrchestrator::new(config, mocks.collaborators()).unwrap()
}

fn add_jobs(orchestrator: &PipelineOrchestrator, count: usize) -> Vec<retouch_pipeline::JobId> {
    (0..count)
        .map(|n| {
            orchestrator
                .add_image(sample_png(4, 4, [n as u8, 0, 0, 255]), format!("ring_{}.png", n))
                .unwrap()
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_batch_of_seven_runs_in_groups_of_three() {
    let mocks = MockCollaborators::new(
        MockContentRemover::new().with_delay(Duration::from_secs(1)),
        MockImageHost::new(),
        MockUpscaler::completing(FINAL_URL),
    );
    let orchestrator = orchestrator(&mocks);
    let ids = add_jobs(&orchestrator, 7);

    let report = orchestrator.process_batch(&ids).await.unwrap();

    assert_eq!(report.group_sizes, vec![3, 3, 1]);
    assert_eq!(report.completed(), 7);
    assert_eq!(report.failed(), 0);

    // A group starts only after every job of the previous group finished
    assert_eq!(mocks.remover.finished_at_start(), vec![0, 0, 0, 3, 3, 3, 6]);
    assert!(mocks.remover.peak_in_flight() <= 3);
    assert_eq!(mocks.upscaler.submit_count(), 7);
    assert!(!orchestrator.is_processing());
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_abort_batch() {
    let mocks = MockCollaborators::new(
        MockContentRemover::failing("503 Service Unavailable"),
        MockImageHost::new(),
        MockUpscaler::completing(FINAL_URL),
    );
    let orchestrator = orchestrator(&mocks);
    let ids = add_jobs(&orchestrator, 4);

    let report = orchestrator.process_batch(&ids).await.unwrap();
    assert_eq!(report.total(), 4);
    assert_eq!(report.failed(), 4);
    assert_eq!(mocks.remover.call_count(), 4);

    // Stage 2 is never entered after a Stage-1 failure
    assert_eq!(mocks.host.upload_count(), 0);
    assert_eq!(mocks.upscaler.submit_count(), 0);

    for id in ids {
        let job = orchestrator.job(id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.progress(), 0);
        assert_eq!(job.failure().unwrap().kind, ErrorKind::RemoteCall);
        assert!(job.error_detail().unwrap().contains("503"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_content_policy_refusal_is_recorded() {
    let message = "The service cannot directly manipulate images.";
    let mocks = MockCollaborators::new(
        MockContentRemover::refusing(message),
        MockImageHost::new(),
        MockUpscaler::completing(FINAL_URL),
    );
    let orchestrator = orchestrator(&mocks);
    let id = add_jobs(&orchestrator, 1)[0];

    let err = orchestrator.submit(id, None).await.unwrap_err();
    assert!(matches!(err, RetouchError::ContentPolicy(_)));

    let job = orchestrator.job(id).unwrap();
    assert_eq!(job.failure().unwrap().kind, ErrorKind::ContentPolicy);
    assert_eq!(job.error_detail(), Some(message));
    assert!(job.stage1_result().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_completes_on_last_allowed_attempt() {
    let mocks = MockCollaborators::new(
        MockContentRemover::new(),
        MockImageHost::new(),
        MockUpscaler::new().then_pending(59).then_completed(FINAL_URL),
    );
    let orchestrator = orchestrator(&mocks);

    let url = orchestrator
        .poll_until_done(RemoteJobTicket::new("task-1".to_string()))
        .await
        .unwrap();
    assert_eq!(url, FINAL_URL);
    assert_eq!(mocks.upscaler.poll_count(), 60);
}

#[tokio::test(start_paused = true)]
async fn test_polling_times_out_after_sixty_attempts() {
    let mocks = MockCollaborators::new(
        MockContentRemover::new(),
        MockImageHost::new(),
        MockUpscaler::new().then_pending(60).then_completed(FINAL_URL),
    );
    let orchestrator = orchestrator(&mocks);

    let started = tokio::time::Instant::now();
    let err = orchestrator
        .poll_until_done(RemoteJobTicket::new("task-1".to_string()))
        .await
        .unwrap_err();

    match err {
        RetouchError::PollingTimeout {
            attempts,
            last_response,
        } => {
            assert_eq!(attempts, 60);
            assert!(last_response.contains("PENDING"));
        },
        other => panic!("expected a polling timeout, got {:?}", other),
    }
    assert_eq!(mocks.upscaler.poll_count(), 60);
    assert!(started.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_failure_stops_polling() {
    let mocks = MockCollaborators::new(
        MockContentRemover::new(),
        MockImageHost::new(),
        MockUpscaler::new().then_failed(Some("Input image too small")),
    );
    let orchestrator = orchestrator(&mocks);
    let id = add_jobs(&orchestrator, 1)[0];

    let err = orchestrator.submit(id, None).await.unwrap_err();
    assert!(matches!(err, RetouchError::UpscaleFailed(_)));
    assert_eq!(err.to_string(), "Input image too small");
    assert_eq!(mocks.upscaler.poll_count(), 1);

    let job = orchestrator.job(id).unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.failure().unwrap().kind, ErrorKind::UpscaleFailed);
    // The intermediate survives the failure
    assert!(job.stage1_result().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_transport_errors_are_retried() {
    let mocks = MockCollaborators::new(
        MockContentRemover::new(),
        MockImageHost::new(),
        MockUpscaler::new()
            .then_transport_errors(3)
            .then_pending(2)
            .then_completed(FINAL_URL),
    );
    let orchestrator = orchestrator(&mocks);
    let id = add_jobs(&orchestrator, 1)[0];

    let status = orchestrator.submit(id, None).await.unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(mocks.upscaler.poll_count(), 6);

    let job = orchestrator.job(id).unwrap();
    assert_eq!(job.result_url(), Some(FINAL_URL));
    assert_eq!(job.progress(), 100);
    assert!(job.stage2_result().is_some());
    assert_eq!(mocks.fetcher.fetched_urls(), vec![FINAL_URL.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_await_policy_then_continue() {
    let mocks = MockCollaborators::happy_path();
    let config = PipelineConfig::builder()
        .continuation(ContinuationPolicy::AwaitChoice)
        .build()
        .unwrap();
    let orchestrator = orchestrator_with(&mocks, config);
    let ids = add_jobs(&orchestrator, 2);

    let report = orchestrator.process_batch(&ids).await.unwrap();
    assert_eq!(report.awaiting_choice(), 2);
    assert_eq!(mocks.host.upload_count(), 0);

    // Continue the first job as-is, the second with a refined image
    orchestrator.continue_job(ids[0], None).await.unwrap();
    orchestrator
        .continue_job(ids[1], Some(sample_png(4, 4, [1, 2, 3, 255])))
        .await
        .unwrap();

    for id in &ids {
        assert_eq!(orchestrator.job(*id).unwrap().status(), JobStatus::Completed);
    }
    assert_eq!(mocks.host.upload_count(), 2);
    assert_eq!(mocks.upscaler.submit_count(), 2);

    // A completed job cannot be continued again
    let err = orchestrator.continue_job(ids[0], None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test(start_paused = true)]
async fn test_publish_without_url_fails_job() {
    let mocks = MockCollaborators::new(
        MockContentRemover::new(),
        MockImageHost::replying(PublishResponse {
            success: true,
            url: None,
        }),
        MockUpscaler::completing(FINAL_URL),
    );
    let orchestrator = orchestrator(&mocks);
    let id = add_jobs(&orchestrator, 1)[0];

    let err = orchestrator.submit(id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PublishFailed);
    assert_eq!(mocks.upscaler.submit_count(), 0);
    assert_eq!(orchestrator.job(id).unwrap().status(), JobStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_submission_fails_job() {
    let mocks = MockCollaborators::new(
        MockContentRemover::new(),
        MockImageHost::new(),
        MockUpscaler::new().with_submission(UpscaleSubmission {
            success: false,
            request_id: None,
            error: Some("Insufficient credits".to_string()),
        }),
    );
    let orchestrator = orchestrator(&mocks);
    let id = add_jobs(&orchestrator, 1)[0];

    let err = orchestrator.submit(id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SubmissionFailed);
    assert!(err.to_string().contains("Insufficient credits"));
    assert_eq!(mocks.upscaler.poll_count(), 0);

    let job = orchestrator.job(id).unwrap();
    assert_eq!(job.intermediate_url(), Some("https://host.test/1.png"));
}

#[tokio::test(start_paused = true)]
async fn test_submission_carries_public_url_and_mode() {
    let mocks = MockCollaborators::happy_path();
    let orchestrator = orchestrator(&mocks);
    let id = add_jobs(&orchestrator, 1)[0];

    orchestrator.submit(id, None).await.unwrap();

    let submissions = mocks.upscaler.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].source_url, "https://host.test/1.png");
    assert_eq!(submissions[0].mode, "fast");
    assert!(!submissions[0].callback_url.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_process_pending_picks_up_new_jobs_only() {
    let mocks = MockCollaborators::happy_path();
    let orchestrator = orchestrator(&mocks);

    add_jobs(&orchestrator, 2);
    let first = orchestrator.process_pending().await.unwrap();
    assert_eq!(first.completed(), 2);

    add_jobs(&orchestrator, 1);
    let second = orchestrator.process_pending().await.unwrap();
    assert_eq!(second.total(), 1);

    let stats = orchestrator.statistics().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.pending, 0);
}
