//! Remote collaborator interfaces
//!
//! The pipeline talks to four services: a generative editor (content removal
//! and crop patches), a public image host, an asynchronous upscaler and a plain
//! result download. Each is a trait so the orchestrator can be driven by the
//! HTTP clients in [`http`] or by the scriptable doubles in [`test_utils`].
//!
//! Responses are handed back raw; the rules for what counts as a usable URL or
//! request id live in the orchestrator.

use crate::error::Result;
use crate::types::{FocusPoint, ImageBuffer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod http;
pub mod test_utils;

/// Stage-1 collaborator: removes content around a focus point
#[async_trait]
pub trait ContentRemover: Send + Sync {
    /// Edit `source`, returning the edited image
    ///
    /// # Errors
    /// - `ContentPolicy` when the service refuses the edit
    /// - `RemoteCall` for transport or non-2xx failures
    async fn remove_content(
        &self,
        source: &ImageBuffer,
        focus: FocusPoint,
        instruction: &str,
    ) -> Result<ImageBuffer>;
}

/// Regenerates a square crop from a free-form prompt
#[async_trait]
pub trait PatchGenerator: Send + Sync {
    async fn generate_patch(&self, crop: &ImageBuffer, prompt: &str) -> Result<ImageBuffer>;
}

/// Public hosting response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    pub url: Option<String>,
}

/// Uploads an image so the upscaler can fetch it by URL
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn publish(&self, image: &ImageBuffer) -> Result<PublishResponse>;
}

/// Upscale job request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpscaleRequest {
    pub source_url: String,
    pub mode: String,
    pub callback_url: String,
}

/// Response to an upscale job submission
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpscaleSubmission {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One status-endpoint response, with the raw JSON kept for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct UpscaleStatus {
    pub status: Option<String>,
    pub result: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub raw: serde_json::Value,
}

impl UpscaleStatus {
    /// Pick the known fields out of a status response
    #[must_use]
    pub fn from_json(raw: serde_json::Value) -> Self {
        let text = |key: &str| match raw.get(key) {
            Some(serde_json::Value::String(value)) => Some(value.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Self {
            status: text("status"),
            result: text("result"),
            result_url: text("result_url"),
            error: text("error"),
            raw,
        }
    }

    /// Status upper-cased, empty when absent
    #[must_use]
    pub fn normalized_status(&self) -> String {
        self.status
            .as_deref()
            .map(|s| s.trim().to_ascii_uppercase())
            .unwrap_or_default()
    }

    /// First non-empty of `result` and `result_url`
    #[must_use]
    pub fn final_url(&self) -> Option<&str> {
        [self.result.as_deref(), self.result_url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|url| !url.is_empty())
    }
}

/// Stage-2 collaborator: asynchronous upscale job
#[async_trait]
pub trait Upscaler: Send + Sync {
    async fn submit(&self, request: &UpscaleRequest) -> Result<UpscaleSubmission>;

    /// Fetch the current status of a submitted job
    ///
    /// # Errors
    /// - `RemoteCall` for transport or non-2xx failures (retried by the poller)
    async fn status(&self, request_id: &str) -> Result<UpscaleStatus>;
}

/// Downloads a finished result
#[async_trait]
pub trait ResultFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ImageBuffer>;
}

/// The set of collaborators one orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub remover: Arc<dyn ContentRemover>,
    pub host: Arc<dyn ImageHost>,
    pub upscaler: Arc<dyn Upscaler>,
    pub fetcher: Arc<dyn ResultFetcher>,
}

impl Collaborators {
    #[must_use]
    pub fn new(
        remover: Arc<dyn ContentRemover>,
        host: Arc<dyn ImageHost>,
        upscaler: Arc<dyn Upscaler>,
        fetcher: Arc<dyn ResultFetcher>,
    ) -> Self {
        Self {
            remover,
            host,
            upscaler,
            fetcher,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
