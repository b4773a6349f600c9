//! Application configuration for the `posepipe` binary

use anyhow::Context;
use posepipe_bridge::BridgeConfig;
use posepipe_core::GlobalProps;
use posepipe_pipeline::{PipelineSpec, StageSpec, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything `posepipe track` needs, loadable from one TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub bridge: BridgeConfig,
    /// Pipeline to build; the demo pipeline when absent
    pub pipeline: Option<PipelineSpec>,
    /// Base directory for relative paths in transformer parameters
    pub working_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {:?}", path))?;
        let mut config: AppConfig =
            toml::from_str(&text).with_context(|| format!("Invalid config file {:?}", path))?;

        // Relative working directories are taken relative to the config file
        if let (Some(dir), Some(parent)) = (&config.working_dir, path.parent()) {
            if dir.is_relative() {
                config.working_dir = Some(parent.join(dir));
            }
        }
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        self.bridge.validate()?;
        if let Some(pipeline) = &self.pipeline {
            if pipeline.stages.is_empty() {
                return Err("Pipeline must have at least one stage".to_string());
            }
        }
        Ok(())
    }

    pub fn pipeline_spec(&self) -> PipelineSpec {
        self.pipeline.clone().unwrap_or_else(demo_pipeline)
    }

    pub fn props(&self) -> GlobalProps {
        match &self.working_dir {
            Some(dir) => GlobalProps::with_working_dir(dir),
            None => GlobalProps::new(),
        }
    }
}

/// Synthetic camera tracked by the bright-spot model; the wrist height is
/// mapped to the published signal
pub fn demo_pipeline() -> PipelineSpec {
    PipelineSpec::new(vec![
        StageSpec::new("video_source")
            .param("source", "synthetic")
            .param("fps", 30),
        StageSpec::new("model_runner").param("model", "bright_spot"),
        StageSpec::nested(vec![
            StageSpec::new("metric_extractor"),
            StageSpec::new("sliding_average").param("window", 5),
        ])
        .named("Metrics"),
        StageSpec::new("min_max_selector")
            .param("input", "right_wrist.y")
            .param("min", 0.1)
            .param("max", 0.9),
        StageSpec::new("signal_publisher"),
    ])
    .named("Demo")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default_uses_demo_pipeline() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        let spec = config.pipeline_spec();
        assert_eq!(spec.stages[0].kind, "video_source");
        assert_eq!(spec.stages.last().map(|s| s.kind.as_str()), Some("signal_publisher"));
    }

    #[test]
    fn test_config_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posepipe.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
            working_dir = "media"

            [stream]
            target_fps = 25

            [bridge]
            listen_addr = "0.0.0.0:7000"

            [[pipeline.stages]]
            kind = "video_source"
            params = {{ source = "directory", path = "clip" }}

            [[pipeline.stages]]
            kind = "min_max_selector"
            params = {{ input = "nose.confidence" }}
            "#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.target_fps, Some(25));
        assert_eq!(config.bridge.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.bridge.queue_capacity, 8);
        assert_eq!(config.pipeline_spec().stages.len(), 2);
        assert_eq!(config.working_dir, Some(dir.path().join("media")));
    }

    #[test]
    fn test_config_validation_empty_pipeline() {
        let config = AppConfig {
            pipeline: Some(PipelineSpec::default()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/posepipe.toml")).unwrap_err();
        assert!(err.to_string().contains("Cannot read config file"));
    }
}
