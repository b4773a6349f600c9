//! File sinks: keypoint recordings and frame dumps

use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use posepipe_core::{Error, FrameData, GlobalProps, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

pub const KEYPOINT_RECORDER: &str = "keypoint_recorder";
pub const FRAME_RECORDER: &str = "frame_recorder";
pub const METRICS_RECORDER: &str = "metrics_recorder";

/// Appends every keypoint set as one JSON line, readable by `keypoint_replay`
pub struct KeypointRecorder {
    base: TransformerBase,
    props: GlobalProps,
    path: String,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl KeypointRecorder {
    pub fn new(props: GlobalProps) -> Self {
        Self {
            base: TransformerBase::new(KEYPOINT_RECORDER, "Keypoint Recorder"),
            props,
            path: "keypoints.jsonl".to_string(),
            writer: None,
            written: 0,
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: KEYPOINT_RECORDER,
            description: "Appends each pass's keypoints to a JSON lines file",
            role: Role::Sink,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(ctx.props.clone())))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![ParamSpec::text("path", "Output file, relative to the working directory")]
    }

    fn target(&self) -> PathBuf {
        self.props.resolve(&self.path)
    }
}

impl Transformer for KeypointRecorder {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn role(&self) -> Role {
        Role::Sink
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Self::param_specs()
    }

    fn get_parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "path").then(|| self.path.clone().into())
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("path", ParamValue::Text(path)) if !path.trim().is_empty() => {
                self.path = path;
                Ok(())
            }
            (name, value) => Err(Error::config(format!(
                "Cannot set '{}' to {} on '{}'",
                name,
                value,
                self.name()
            ))),
        }
    }

    fn open(&mut self) -> Result<()> {
        let path = self.target();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::resource(format!("Cannot create {:?}: {}", parent, e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::resource(format!("Cannot open {:?}: {}", path, e)))?;
        self.writer = Some(BufWriter::new(file));
        self.written = 0;
        info!("Recording keypoints to {:?}", path);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush keypoint recording: {}", e);
            }
            info!("Recorded {} keypoint sets", self.written);
        }
    }

    fn transform(&mut self, frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        let Some(keypoints) = frame.keypoints.as_ref() else {
            return Ok(Flow::Continue(frame));
        };
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::resource("Keypoint recorder is not open"))?;
        let line = serde_json::to_string(&keypoints.to_record()).map_err(Error::transform)?;
        writeln!(writer, "{}", line)
            .map_err(|e| Error::resource(format!("Writing keypoints failed: {}", e)))?;
        self.written += 1;
        Ok(Flow::Continue(frame))
    }
}

/// Writes every frame image as a numbered PNG
pub struct FrameRecorder {
    base: TransformerBase,
    props: GlobalProps,
    directory: String,
    target: Option<PathBuf>,
    fallback_index: u64,
}

impl FrameRecorder {
    pub fn new(props: GlobalProps) -> Self {
        Self {
            base: TransformerBase::new(FRAME_RECORDER, "Frame Recorder"),
            props,
            directory: "frames".to_string(),
            target: None,
            fallback_index: 0,
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: FRAME_RECORDER,
            description: "Saves each frame as a PNG file",
            role: Role::Sink,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(ctx.props.clone())))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![ParamSpec::text("directory", "Output directory, relative to the working directory")]
    }
}

impl Transformer for FrameRecorder {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn role(&self) -> Role {
        Role::Sink
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Self::param_specs()
    }

    fn get_parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "directory").then(|| self.directory.clone().into())
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("directory", ParamValue::Text(dir)) if !dir.trim().is_empty() => {
                self.directory = dir;
                Ok(())
            }
            (name, value) => Err(Error::config(format!(
                "Cannot set '{}' to {} on '{}'",
                name,
                value,
                self.name()
            ))),
        }
    }

    fn open(&mut self) -> Result<()> {
        let dir = self.props.resolve(&self.directory);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::resource(format!("Cannot create {:?}: {}", dir, e)))?;
        info!("Recording frames to {:?}", dir);
        self.target = Some(dir);
        self.fallback_index = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.target = None;
    }

    fn transform(&mut self, frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        let Some(image) = frame.image.as_ref() else {
            return Ok(Flow::Continue(frame));
        };
        let dir = self
            .target
            .as_ref()
            .ok_or_else(|| Error::resource("Frame recorder is not open"))?;
        let index = frame.frame_index().unwrap_or(self.fallback_index);
        self.fallback_index = index + 1;
        let path = dir.join(format!("frame_{:06}.png", index));
        image
            .save(&path)
            .map_err(|e| Error::resource(format!("Cannot write {:?}: {}", path, e)))?;
        Ok(Flow::Continue(frame))
    }
}

/// One observation of a metric, with the range it was normalized against
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Collects every metric value of a run and writes them as one JSON object,
/// `{ "<metric>": [{ "value", "min", "max" }, ...] }`, when the run ends
pub struct MetricsRecorder {
    base: TransformerBase,
    props: GlobalProps,
    path: String,
    file: Option<(PathBuf, File)>,
    samples: BTreeMap<String, Vec<MetricSample>>,
}

impl MetricsRecorder {
    pub fn new(props: GlobalProps) -> Self {
        Self {
            base: TransformerBase::new(METRICS_RECORDER, "Metrics Recorder"),
            props,
            path: "metrics.json".to_string(),
            file: None,
            samples: BTreeMap::new(),
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: METRICS_RECORDER,
            description: "Records every metric with its min/max bounds to a JSON file",
            role: Role::Sink,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(ctx.props.clone())))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![ParamSpec::text("path", "Output file, relative to the working directory")]
    }

    /// Samples gathered in the current run
    pub fn samples(&self) -> &BTreeMap<String, Vec<MetricSample>> {
        &self.samples
    }
}

impl Transformer for MetricsRecorder {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn role(&self) -> Role {
        Role::Sink
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Self::param_specs()
    }

    fn get_parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "path").then(|| self.path.clone().into())
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("path", ParamValue::Text(path)) if !path.trim().is_empty() => {
                self.path = path;
                Ok(())
            }
            (name, value) => Err(Error::config(format!(
                "Cannot set '{}' to {} on '{}'",
                name,
                value,
                self.name()
            ))),
        }
    }

    fn open(&mut self) -> Result<()> {
        let path = self.props.resolve(&self.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::resource(format!("Cannot create {:?}: {}", parent, e)))?;
        }
        let file = File::create(&path)
            .map_err(|e| Error::resource(format!("Cannot open {:?}: {}", path, e)))?;
        self.samples.clear();
        info!("Recording metrics to {:?}", path);
        self.file = Some((path, file));
        Ok(())
    }

    fn close(&mut self) {
        let Some((path, file)) = self.file.take() else {
            return;
        };
        let mut writer = BufWriter::new(file);
        let written = serde_json::to_writer(&mut writer, &self.samples)
            .map_err(|e| e.to_string())
            .and_then(|_| writer.flush().map_err(|e| e.to_string()));
        match written {
            Ok(()) => info!(
                "Recorded {} metrics to {:?}",
                self.samples.len(),
                path
            ),
            Err(e) => warn!("Failed to write metrics to {:?}: {}", path, e),
        }
    }

    fn transform(&mut self, frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        if self.file.is_none() {
            return Err(Error::resource("Metrics recorder is not open"));
        }
        for (name, value) in frame.metadata.metrics() {
            let (min, max) = frame.metadata.metric_bounds(name);
            self.samples
                .entry(name.to_string())
                .or_default()
                .push(MetricSample { value, min, max });
        }
        Ok(Flow::Continue(frame))
    }
}
