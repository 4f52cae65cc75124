//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{CliPolicy, ProcessArgs};
use crate::config::{ContinuationPolicy, PipelineConfig};
use anyhow::{Context, Result};

/// Convert `process` arguments into a [`PipelineConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply command-line overrides
    pub(crate) fn from_args(args: &ProcessArgs) -> Result<PipelineConfig> {
        let mut config = match &args.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(policy) = args.policy {
            config.continuation = match policy {
                CliPolicy::Auto => ContinuationPolicy::AutoContinue,
                CliPolicy::Await => ContinuationPolicy::AwaitChoice,
            };
        }
        if let Some(hotspot) = args.hotspot {
            config.default_hotspot = hotspot;
        }
        if let Some(concurrency) = args.concurrency {
            config.batch_concurrency = concurrency;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FocusPoint;
    use std::path::PathBuf;

    fn args() -> ProcessArgs {
        ProcessArgs {
            inputs: vec![PathBuf::from("ring.jpg")],
            output: PathBuf::from("."),
            hotspot: None,
            policy: None,
            config: None,
            concurrency: None,
            progress: false,
        }
    }

    #[test]
    fn test_defaults() {
        let config = CliConfigBuilder::from_args(&args()).unwrap();
        assert_eq!(config.continuation, ContinuationPolicy::AutoContinue);
        assert_eq!(config.batch_concurrency, 3);
        assert_eq!(config.default_hotspot, FocusPoint::new(500, 500));
    }

    #[test]
    fn test_overrides() {
        let mut args = args();
        args.policy = Some(CliPolicy::Await);
        args.hotspot = Some(FocusPoint::new(10, 20));
        args.concurrency = Some(5);

        let config = CliConfigBuilder::from_args(&args).unwrap();
        assert_eq!(config.continuation, ContinuationPolicy::AwaitChoice);
        assert_eq!(config.default_hotspot, FocusPoint::new(10, 20));
        assert_eq!(config.batch_concurrency, 5);
    }

    #[test]
    fn test_invalid_concurrency_rejected() {
        let mut args = args();
        args.concurrency = Some(0);
        assert!(CliConfigBuilder::from_args(&args).is_err());
    }

    #[test]
    fn test_config_file_with_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{ "continuation": "await-choice", "batch_concurrency": 2 }"#)
            .unwrap();

        let mut args = args();
        args.config = Some(path);
        args.policy = Some(CliPolicy::Auto);

        let config = CliConfigBuilder::from_args(&args).unwrap();
        assert_eq!(config.batch_concurrency, 2);
        assert_eq!(config.continuation, ContinuationPolicy::AutoContinue);
    }
}
