//! Error types for pipeline and compositing operations

use thiserror::Error;

/// Result type alias for retouch operations
pub type Result<T> = std::result::Result<T, RetouchError>;

/// Comprehensive error types for pipeline and compositing operations
#[derive(Error, Debug)]
pub enum RetouchError {
    /// Input rejected by intake validation (MIME type, size ceiling)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-2xx or transport failure from a remote collaborator
    #[error("{service} request failed: {message}")]
    RemoteCall { service: String, message: String },

    /// The editing service explicitly refused the requested edit
    #[error("{0}")]
    ContentPolicy(String),

    /// The hosting service returned no usable public URL
    #[error("Publishing intermediate image failed: {0}")]
    PublishFailed(String),

    /// The upscale service did not accept the job
    #[error("Upscale submission failed: {0}")]
    SubmissionFailed(String),

    /// The upscale service reported an explicit `FAILED` status
    #[error("{0}")]
    UpscaleFailed(String),

    /// No terminal status observed within the polling budget
    #[error("Upscaling timed out after {attempts} attempts. Last API response was: {last_response}")]
    PollingTimeout { attempts: u32, last_response: String },

    /// Image or region dimensions do not line up
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A drawing surface could not be allocated
    #[error("Rendering unavailable: {0}")]
    RenderingUnavailable(String),

    /// Illegal job status transition
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Job id is not present in the registry
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Processing errors that fit no other category
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fieldless classification of [`RetouchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Validation,
    RemoteCall,
    ContentPolicy,
    PublishFailed,
    SubmissionFailed,
    UpscaleFailed,
    PollingTimeout,
    DimensionMismatch,
    RenderingUnavailable,
    InvalidTransition,
    JobNotFound,
    InvalidConfig,
    Io,
    Image,
    Processing,
    Internal,
}

impl RetouchError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a remote call error attributed to a service
    pub fn remote_call<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::RemoteCall {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a content policy refusal
    pub fn content_policy<S: Into<String>>(msg: S) -> Self {
        Self::ContentPolicy(msg.into())
    }

    /// Create a publish failure
    pub fn publish_failed<S: Into<String>>(msg: S) -> Self {
        Self::PublishFailed(msg.into())
    }

    /// Create an upscale submission failure
    pub fn submission_failed<S: Into<String>>(msg: S) -> Self {
        Self::SubmissionFailed(msg.into())
    }

    /// Create an explicit upscale failure
    pub fn upscale_failed<S: Into<String>>(msg: S) -> Self {
        Self::UpscaleFailed(msg.into())
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch<S: Into<String>>(msg: S) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create a rendering unavailable error
    pub fn rendering_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::RenderingUnavailable(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a remote call error from a reqwest failure
    pub fn network_error(service: &str, context: &str, error: &reqwest::Error) -> Self {
        Self::remote_call(service, format!("{}: {}", context, error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::RemoteCall { .. } => ErrorKind::RemoteCall,
            Self::ContentPolicy(_) => ErrorKind::ContentPolicy,
            Self::PublishFailed(_) => ErrorKind::PublishFailed,
            Self::SubmissionFailed(_) => ErrorKind::SubmissionFailed,
            Self::UpscaleFailed(_) => ErrorKind::UpscaleFailed,
            Self::PollingTimeout { .. } => ErrorKind::PollingTimeout,
            Self::DimensionMismatch(_) => ErrorKind::DimensionMismatch,
            Self::RenderingUnavailable(_) => ErrorKind::RenderingUnavailable,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::JobNotFound(_) => ErrorKind::JobNotFound,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Io(_) => ErrorKind::Io,
            Self::Image(_) => ErrorKind::Image,
            Self::Processing(_) => ErrorKind::Processing,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
