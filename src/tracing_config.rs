//! Tracing configuration for structured logging
//!
//! Applications configure the subscriber (see [`TracingConfig::init`], CLI
//! only); the library itself only emits spans and events through the
//! [`spans`] and [`events`] helpers.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored console lines (CLI default)
    Console,
    /// Compact uncolored output for CI logs
    Compact,
    /// JSON lines with span context
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Subscriber settings for the CLI
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level (0 = info, 1 = debug, 2+ = trace)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Explicit filter directive, overrides `verbosity`
    pub env_filter: Option<String>,
    /// Session id attached to the startup event
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    ///
    /// HTTP client internals stay at `info` until `-vv`.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug,hyper=info,reqwest=info,rustls=info",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(directive) => EnvFilter::try_new(directive)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "🚀 Retouch session started");
        }
        Ok(())
    }
}

/// Initialize tracing with CLI defaults and a fresh session id
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone())
        .init()?;
    Ok(session_id)
}

/// Span helpers for pipeline operations
pub mod spans {
    use tracing::{Level, Span};

    /// Whole CLI invocation
    pub fn session(session_id: &str, policy: &str) -> Span {
        tracing::span!(Level::INFO, "session", session_id = %session_id, policy = %policy)
    }

    pub fn batch(job_count: usize, concurrency: usize) -> Span {
        tracing::span!(Level::INFO, "batch", job_count, concurrency)
    }

    pub fn batch_group(group: usize, size: usize) -> Span {
        tracing::span!(Level::INFO, "batch_group", group, size)
    }

    /// One job's end-to-end run
    pub fn job(job_id: &str) -> Span {
        tracing::span!(Level::INFO, "job", job_id = %job_id)
    }

    pub fn stage(name: &'static str) -> Span {
        tracing::span!(Level::DEBUG, "stage", stage = name)
    }

    /// Upscale status polling loop
    pub fn poll(task_id: &str, max_attempts: u32) -> Span {
        tracing::span!(Level::DEBUG, "poll", task_id = %task_id, max_attempts)
    }

    pub fn compositing(operation: &'static str, width: u32, height: u32) -> Span {
        tracing::span!(Level::DEBUG, "compositing", operation, width, height)
    }
}

/// Event helpers shared by the pipeline and the CLI
pub mod events {
    use tracing::{debug, error, info, warn};

    /// User-facing progress line
    pub fn progress(message: &str, emoji: &str) {
        info!("{} {}", emoji, message);
    }

    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(error = %error, context = %context, "❌ Operation failed");
    }

    /// One status request of the polling loop
    ///
    /// `status` is `None` when the request itself failed.
    pub fn poll_attempt(task_id: &str, attempt: u32, max_attempts: u32, status: Option<&str>) {
        match status {
            Some(status) => debug!(
                task_id = %task_id,
                attempt,
                max_attempts,
                status = %status,
                "🔄 Upscale status"
            ),
            None => warn!(
                task_id = %task_id,
                attempt,
                max_attempts,
                "⚠️  Upscale status request failed, retrying"
            ),
        }
    }

    pub fn stage_completed(stage: &str, duration_ms: u64) {
        debug!(stage = %stage, duration_ms, "⏱️  Stage completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert!(TracingConfig::new()
            .with_verbosity(1)
            .verbosity_to_filter()
            .starts_with("debug"));
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(9).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(1)
            .with_format(TracingFormat::Compact)
            .with_env_filter("retouch_pipeline=trace")
            .with_session_id("session-1");

        assert_eq!(config.verbosity, 1);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("retouch_pipeline=trace"));
        assert_eq!(config.session_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn test_helpers_without_subscriber() {
        let _entered = spans::job("job-1").entered();
        let _poll = spans::poll("task-1", 60).entered();
        events::poll_attempt("task-1", 1, 60, Some("PENDING"));
        events::poll_attempt("task-1", 2, 60, None);
        events::stage_completed("content_removal", 12);
    }
}
