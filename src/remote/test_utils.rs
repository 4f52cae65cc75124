//! Scriptable collaborator doubles
//!
//! Mock implementations of the remote traits for exercising the orchestrator
//! without network access. Every mock records its calls so tests can assert
//! on what was (or was not) invoked.

use super::{
    ContentRemover, ImageHost, PatchGenerator, PublishResponse, ResultFetcher, UpscaleRequest,
    UpscaleStatus, UpscaleSubmission, Upscaler,
};
use crate::error::{Result, RetouchError};
use crate::types::{FocusPoint, ImageBuffer};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Small solid PNG used as a stand-in result
pub fn sample_png(width: u32, height: u32, color: [u8; 4]) -> ImageBuffer {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    match ImageBuffer::encode_png(&image) {
        Ok(buffer) => buffer,
        Err(_) => ImageBuffer::new(Vec::new(), crate::types::MimeType::Png),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Failure a mock should produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    Remote(String),
    ContentPolicy(String),
}

impl MockFailure {
    fn to_error(&self, service: &str) -> RetouchError {
        match self {
            Self::Remote(message) => RetouchError::remote_call(service, message.clone()),
            Self::ContentPolicy(message) => RetouchError::content_policy(message.clone()),
        }
    }
}

/// Tracks concurrently running calls and the peak seen
#[derive(Debug, Default)]
pub struct InFlightCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

impl InFlightCounter {
    fn enter(&self) -> usize {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.finished.load(Ordering::SeqCst)
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Mock Stage-1 editor
#[derive(Debug)]
pub struct MockContentRemover {
    result: ImageBuffer,
    failure: Option<MockFailure>,
    delay: Duration,
    calls: Mutex<Vec<FocusPoint>>,
    finished_at_start: Mutex<Vec<usize>>,
    in_flight: InFlightCounter,
}

impl Default for MockContentRemover {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContentRemover {
    /// Succeeds with a small PNG
    #[must_use]
    pub fn new() -> Self {
        Self {
            result: sample_png(4, 4, [200, 180, 160, 255]),
            failure: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            finished_at_start: Mutex::new(Vec::new()),
            in_flight: InFlightCounter::default(),
        }
    }

    /// Fails every call with `RemoteCall`
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(MockFailure::Remote(message.to_string())),
            ..Self::new()
        }
    }

    /// Refuses every call with `ContentPolicy`
    #[must_use]
    pub fn refusing(message: &str) -> Self {
        Self {
            failure: Some(MockFailure::ContentPolicy(message.to_string())),
            ..Self::new()
        }
    }

    /// Hold each call open for `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: ImageBuffer) -> Self {
        self.result = result;
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Focus points received, in call order
    #[must_use]
    pub fn focus_points(&self) -> Vec<FocusPoint> {
        lock(&self.calls).clone()
    }

    /// For each call, how many earlier calls had already finished when it began
    #[must_use]
    pub fn finished_at_start(&self) -> Vec<usize> {
        lock(&self.finished_at_start).clone()
    }

    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak()
    }
}

#[async_trait]
impl ContentRemover for MockContentRemover {
    async fn remove_content(
        &self,
        _source: &ImageBuffer,
        focus: FocusPoint,
        _instruction: &str,
    ) -> Result<ImageBuffer> {
        lock(&self.calls).push(focus);
        let finished = self.in_flight.enter();
        lock(&self.finished_at_start).push(finished);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.exit();

        match &self.failure {
            Some(failure) => Err(failure.to_error("generative edit")),
            None => Ok(self.result.clone()),
        }
    }
}

/// Mock crop regenerator returning a solid patch of the requested size
#[derive(Debug, Default)]
pub struct MockPatchGenerator {
    color: [u8; 4],
    failure: Option<MockFailure>,
    prompts: Mutex<Vec<String>>,
}

impl MockPatchGenerator {
    #[must_use]
    pub fn new(color: [u8; 4]) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn refusing(message: &str) -> Self {
        Self {
            failure: Some(MockFailure::ContentPolicy(message.to_string())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl PatchGenerator for MockPatchGenerator {
    async fn generate_patch(&self, crop: &ImageBuffer, prompt: &str) -> Result<ImageBuffer> {
        lock(&self.prompts).push(prompt.to_string());
        if let Some(failure) = &self.failure {
            return Err(failure.to_error("generative edit"));
        }
        let (width, height) = crop.decode()?.dimensions();
        Ok(sample_png(width, height, self.color))
    }
}

/// Mock public host
#[derive(Debug)]
pub struct MockImageHost {
    reply: Option<PublishResponse>,
    uploads: AtomicUsize,
}

impl Default for MockImageHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageHost {
    /// Publishes to `https://host.test/<n>.png`
    #[must_use]
    pub fn new() -> Self {
        Self {
            reply: None,
            uploads: AtomicUsize::new(0),
        }
    }

    /// Always answers with `reply`
    #[must_use]
    pub fn replying(reply: PublishResponse) -> Self {
        Self {
            reply: Some(reply),
            uploads: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageHost for MockImageHost {
    async fn publish(&self, _image: &ImageBuffer) -> Result<PublishResponse> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.reply.clone().unwrap_or_else(|| PublishResponse {
            success: true,
            url: Some(format!("https://host.test/{}.png", n)),
        }))
    }
}

/// One scripted status-endpoint outcome
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedStatus {
    Reply(serde_json::Value),
    TransportError(String),
}

/// Mock asynchronous upscaler driven by a status script
///
/// Once the script runs dry every further poll answers with the fallback
/// status (`PENDING` unless configured otherwise).
#[derive(Debug)]
pub struct MockUpscaler {
    submission: Option<UpscaleSubmission>,
    script: Mutex<VecDeque<ScriptedStatus>>,
    fallback: serde_json::Value,
    submissions: Mutex<Vec<UpscaleRequest>>,
    polls: Mutex<Vec<String>>,
}

impl Default for MockUpscaler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUpscaler {
    /// Accepts submissions as `task-<n>` with an empty status script
    #[must_use]
    pub fn new() -> Self {
        Self {
            submission: None,
            script: Mutex::new(VecDeque::new()),
            fallback: json!({ "status": "PENDING" }),
            submissions: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
        }
    }

    /// Every poll reports completion with `url`
    #[must_use]
    pub fn completing(url: &str) -> Self {
        Self {
            fallback: json!({ "status": "COMPLETED", "result": url }),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_submission(mut self, submission: UpscaleSubmission) -> Self {
        self.submission = Some(submission);
        self
    }

    #[must_use]
    pub fn then(self, status: ScriptedStatus) -> Self {
        lock(&self.script).push_back(status);
        self
    }

    #[must_use]
    pub fn then_reply(self, raw: serde_json::Value) -> Self {
        self.then(ScriptedStatus::Reply(raw))
    }

    #[must_use]
    pub fn then_pending(self, times: usize) -> Self {
        (0..times).fold(self, |mock, _| mock.then_reply(json!({ "status": "PENDING" })))
    }

    #[must_use]
    pub fn then_completed(self, url: &str) -> Self {
        self.then_reply(json!({ "status": "COMPLETED", "result": url }))
    }

    #[must_use]
    pub fn then_failed(self, error: Option<&str>) -> Self {
        match error {
            Some(message) => self.then_reply(json!({ "status": "FAILED", "error": message })),
            None => self.then_reply(json!({ "status": "FAILED" })),
        }
    }

    #[must_use]
    pub fn then_transport_errors(self, times: usize) -> Self {
        (0..times).fold(self, |mock, n| {
            mock.then(ScriptedStatus::TransportError(format!("connection reset ({})", n + 1)))
        })
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<UpscaleRequest> {
        lock(&self.submissions).clone()
    }

    #[must_use]
    pub fn submit_count(&self) -> usize {
        lock(&self.submissions).len()
    }

    #[must_use]
    pub fn poll_count(&self) -> usize {
        lock(&self.polls).len()
    }
}

#[async_trait]
impl Upscaler for MockUpscaler {
    async fn submit(&self, request: &UpscaleRequest) -> Result<UpscaleSubmission> {
        let mut submissions = lock(&self.submissions);
        submissions.push(request.clone());
        Ok(self.submission.clone().unwrap_or_else(|| UpscaleSubmission {
            success: true,
            request_id: Some(format!("task-{}", submissions.len())),
            error: None,
        }))
    }

    async fn status(&self, request_id: &str) -> Result<UpscaleStatus> {
        lock(&self.polls).push(request_id.to_string());
        let next = lock(&self.script).pop_front();
        match next {
            Some(ScriptedStatus::Reply(raw)) => Ok(UpscaleStatus::from_json(raw)),
            Some(ScriptedStatus::TransportError(message)) => {
                Err(RetouchError::remote_call("upscale", message))
            },
            None => Ok(UpscaleStatus::from_json(self.fallback.clone())),
        }
    }
}

/// Mock result download
#[derive(Debug)]
pub struct MockResultFetcher {
    result: ImageBuffer,
    fetched: Mutex<Vec<String>>,
}

impl Default for MockResultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResultFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            result: sample_png(8, 8, [10, 20, 30, 255]),
            fetched: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn fetched_urls(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl ResultFetcher for MockResultFetcher {
    async fn fetch(&self, url: &str) -> Result<ImageBuffer> {
        lock(&self.fetched).push(url.to_string());
        Ok(self.result.clone())
    }
}

/// Handles to a full set of mocks plus the `Collaborators` wired to them
#[derive(Debug, Clone)]
pub struct MockCollaborators {
    pub remover: Arc<MockContentRemover>,
    pub host: Arc<MockImageHost>,
    pub upscaler: Arc<MockUpscaler>,
    pub fetcher: Arc<MockResultFetcher>,
}

impl MockCollaborators {
    #[must_use]
    pub fn new(remover: MockContentRemover, host: MockImageHost, upscaler: MockUpscaler) -> Self {
        Self {
            remover: Arc::new(remover),
            host: Arc::new(host),
            upscaler: Arc::new(upscaler),
            fetcher: Arc::new(MockResultFetcher::new()),
        }
    }

    /// Everything succeeds; the upscaler completes on its first poll
    #[must_use]
    pub fn happy_path() -> Self {
        Self::new(
            MockContentRemover::new(),
            MockImageHost::new(),
            MockUpscaler::completing("https://cdn.test/final.png"),
        )
    }

    #[must_use]
    pub fn collaborators(&self) -> super::Collaborators {
        super::Collaborators::new(
            self.remover.clone(),
            self.host.clone(),
            self.upscaler.clone(),
            self.fetcher.clone(),
        )
    }
}
