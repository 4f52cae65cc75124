//! Configuration types for the retouch pipeline

use crate::error::{Result, RetouchError};
use crate::types::FocusPoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the generative edit API key
pub const EDIT_API_KEY_VAR: &str = "RETOUCH_EDIT_API_KEY";
/// Environment variable holding the image hosting API key
pub const HOST_API_KEY_VAR: &str = "RETOUCH_HOST_API_KEY";
/// Environment variable holding the upscale API key
pub const UPSCALE_API_KEY_VAR: &str = "RETOUCH_UPSCALE_API_KEY";

/// What happens to a job once Stage 1 succeeds
///
/// Fixed per orchestrator instance, never chosen per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContinuationPolicy {
    /// Publish and upscale immediately
    #[default]
    AutoContinue,
    /// Park the job in `AwaitingChoice` for interactive refinement
    AwaitChoice,
}

impl std::fmt::Display for ContinuationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoContinue => write!(f, "auto-continue"),
            Self::AwaitChoice => write!(f, "await-choice"),
        }
    }
}

/// Poll cadence for the asynchronous upscale job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay before every status request (milliseconds)
    pub interval_ms: u64,
    /// Maximum number of status requests
    pub max_attempts: u32,
}

impl PollingConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on time spent polling
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: 60, // 60 attempts * 2 seconds = 120-second ceiling
        }
    }
}

/// Remote service endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Generative edit endpoint (content removal and patch generation)
    pub edit_url: String,
    /// Image hosting upload endpoint
    pub host_url: String,
    /// Upscale job submission endpoint
    pub upscale_queue_url: String,
    /// Upscale job status endpoint
    pub upscale_status_url: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            edit_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image-preview:generateContent".to_string(),
            host_url: "https://api.imgbb.com/1/upload".to_string(),
            upscale_queue_url: "https://api.enhancor.ai/api/upscaler/v1/queue".to_string(),
            upscale_status_url: "https://api.enhancor.ai/api/upscaler/v1/status".to_string(),
        }
    }
}

/// API keys for the remote services, sourced from the environment
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub edit_api_key: String,
    pub host_api_key: String,
    pub upscale_api_key: String,
}

impl Credentials {
    /// Read all keys from the environment
    ///
    /// # Errors
    /// - Any of the key variables is unset or empty
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            edit_api_key: read_key(EDIT_API_KEY_VAR)?,
            host_api_key: read_key(HOST_API_KEY_VAR)?,
            upscale_api_key: read_key(UPSCALE_API_KEY_VAR)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("edit_api_key", &"<redacted>")
            .field("host_api_key", &"<redacted>")
            .field("upscale_api_key", &"<redacted>")
            .finish()
    }
}

fn read_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(RetouchError::invalid_config(format!(
            "{} is not set. Please check your environment variables.",
            var
        ))),
    }
}

/// Configuration for the retouch pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Continuation after Stage 1
    pub continuation: ContinuationPolicy,

    /// Jobs run concurrently per batch group
    pub batch_concurrency: usize,

    /// Upscale status polling cadence
    pub polling: PollingConfig,

    /// Focus point used when the caller supplies none
    pub default_hotspot: FocusPoint,

    /// Instruction sent with the content-removal edit
    pub removal_prompt: String,

    /// Upscale mode requested from the upscale service
    pub upscale_mode: String,

    /// Webhook URL the upscale service requires even though we poll
    pub callback_url: String,

    /// Standard deviation of the mask feathering blur, in pixels
    pub feather_sigma: f32,

    /// Per-request HTTP timeout (seconds)
    pub request_timeout_secs: u64,

    /// Remote service endpoints
    pub endpoints: ServiceEndpoints,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continuation: ContinuationPolicy::default(),
            batch_concurrency: 3,
            polling: PollingConfig::default(),
            default_hotspot: FocusPoint::default(),
            removal_prompt: "remove the jewelry at this location".to_string(),
            upscale_mode: "fast".to_string(),
            callback_url: "https://example.com/webhook-placeholder".to_string(),
            feather_sigma: 15.0,
            request_timeout_secs: 120,
            endpoints: ServiceEndpoints::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use retouch_pipeline::{ContinuationPolicy, PipelineConfig};
    ///
    /// let config = PipelineConfig::builder()
    ///     .continuation(ContinuationPolicy::AwaitChoice)
    ///     .batch_concurrency(2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.batch_concurrency, 2);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Load a JSON configuration file; missing fields take their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or failed validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RetouchError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            RetouchError::invalid_config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// - Zero batch concurrency, polling interval or attempt budget
    /// - Non-finite or negative feather sigma
    /// - Empty upscale mode
    pub fn validate(&self) -> Result<()> {
        if self.batch_concurrency == 0 {
            return Err(RetouchError::config_value_error(
                "batch_concurrency",
                self.batch_concurrency,
                ">= 1",
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(RetouchError::config_value_error(
                "polling.max_attempts",
                self.polling.max_attempts,
                ">= 1",
            ));
        }
        if self.polling.interval_ms == 0 {
            return Err(RetouchError::config_value_error(
                "polling.interval_ms",
                self.polling.interval_ms,
                ">= 1",
            ));
        }
        if !self.feather_sigma.is_finite() || self.feather_sigma < 0.0 {
            return Err(RetouchError::config_value_error(
                "feather_sigma",
                self.feather_sigma,
                "finite, >= 0.0",
            ));
        }
        if self.upscale_mode.trim().is_empty() {
            return Err(RetouchError::invalid_config("upscale_mode must not be empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn continuation(mut self, policy: ContinuationPolicy) -> Self {
        self.config.continuation = policy;
        self
    }

    #[must_use]
    pub fn batch_concurrency(mut self, concurrency: usize) -> Self {
        self.config.batch_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.config.polling = PollingConfig {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
        };
        self
    }

    #[must_use]
    pub fn default_hotspot(mut self, hotspot: FocusPoint) -> Self {
        self.config.default_hotspot = hotspot;
        self
    }

    #[must_use]
    pub fn removal_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.removal_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn upscale_mode<S: Into<String>>(mut self, mode: S) -> Self {
        self.config.upscale_mode = mode.into();
        self
    }

    #[must_use]
    pub fn callback_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.callback_url = url.into();
        self
    }

    #[must_use]
    pub fn feather_sigma(mut self, sigma: f32) -> Self {
        self.config.feather_sigma = sigma;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn endpoints(mut self, endpoints: ServiceEndpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Any value rejected by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
