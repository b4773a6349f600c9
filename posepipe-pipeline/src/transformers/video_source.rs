//! Source transformer pulling one frame per pass

use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::source::{DirectorySource, FrameSource, SourceRead, SyntheticSource};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use posepipe_core::{meta, Error, FrameData, GlobalProps, Result};
use tracing::{debug, info};

pub const KIND: &str = "video_source";

const SOURCES: &[&str] = &["synthetic", "directory"];

pub struct VideoSource {
    base: TransformerBase,
    props: GlobalProps,
    source_kind: String,
    path: String,
    width: i64,
    height: i64,
    frames: i64,
    fps: i64,
    /// Injected sources are kept across runs; built ones are rebuilt on open
    custom: bool,
    source: Option<Box<dyn FrameSource>>,
    open: bool,
    frame_index: u64,
}

impl VideoSource {
    pub fn new(props: GlobalProps) -> Self {
        Self {
            base: TransformerBase::new(KIND, "Video Source"),
            props,
            source_kind: "synthetic".to_string(),
            path: String::new(),
            width: 320,
            height: 240,
            frames: 0,
            fps: 30,
            custom: false,
            source: None,
            open: false,
            frame_index: 0,
        }
    }

    /// Wrap an externally provided source (a camera binding, a test double)
    pub fn with_source(source: Box<dyn FrameSource>) -> Self {
        let mut video = Self::new(GlobalProps::default());
        video.custom = true;
        video.source = Some(source);
        video
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: KIND,
            description: "Pulls one frame per pass from a synthetic or directory source",
            role: Role::Source,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(ctx.props.clone())))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::text("source", "Frame source kind").choices(SOURCES),
            ParamSpec::text("path", "Directory of frames (directory source)"),
            ParamSpec::int("width", "Synthetic frame width").range(1.0, 4096.0),
            ParamSpec::int("height", "Synthetic frame height").range(1.0, 4096.0),
            ParamSpec::int("frames", "Synthetic frame count, 0 for endless").at_least(0.0),
            ParamSpec::int("fps", "Synthetic frame rate, 0 for unpaced").range(0.0, 240.0),
        ]
    }

    fn build_source(&self) -> Result<Box<dyn FrameSource>> {
        match self.source_kind.as_str() {
            "synthetic" => Ok(Box::new(SyntheticSource::new(
                self.width as u32,
                self.height as u32,
                self.frames as u64,
                self.fps as u32,
            ))),
            "directory" => {
                if self.path.is_empty() {
                    return Err(Error::config("Directory source needs a path"));
                }
                Ok(Box::new(DirectorySource::new(self.props.resolve(&self.path))))
            }
            other => Err(Error::config(format!("Unknown frame source '{}'", other))),
        }
    }
}

impl Transformer for VideoSource {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn role(&self) -> Role {
        Role::Source
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Self::param_specs()
    }

    fn get_parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "source" => Some(self.source_kind.clone().into()),
            "path" => Some(self.path.clone().into()),
            "width" => Some(self.width.into()),
            "height" => Some(self.height.into()),
            "frames" => Some(self.frames.into()),
            "fps" => Some(self.fps.into()),
            _ => None,
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("source", ParamValue::Text(v)) => self.source_kind = v,
            ("path", ParamValue::Text(v)) => self.path = v,
            ("width", ParamValue::Int(v)) => self.width = v,
            ("height", ParamValue::Int(v)) => self.height = v,
            ("frames", ParamValue::Int(v)) => self.frames = v,
            ("fps", ParamValue::Int(v)) => self.fps = v,
            (name, value) => {
                return Err(Error::config(format!(
                    "Cannot set '{}' to {} on '{}'",
                    name,
                    value,
                    self.name()
                )))
            }
        }
        if self.open {
            debug!("'{}' picks up the new {} on the next run", self.name(), name);
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if !self.custom {
            self.source = Some(self.build_source()?);
        }
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| Error::config("Video source has no frame source"))?;
        source.open()?;
        info!("Opened frame source: {}", source.describe());
        self.frame_index = 0;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            source.close();
            info!("Closed frame source: {}", source.describe());
        }
        if !self.custom {
            self.source = None;
        }
        self.open = false;
    }

    /// Waits in bounded slices so a cancelled run returns promptly
    fn transform(&mut self, mut frame: FrameData, ctx: &PassContext) -> Result<Flow> {
        if !self.open {
            return Err(Error::resource("Frame source is not open"));
        }
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| Error::resource("Frame source is not open"))?;

        loop {
            if ctx.is_cancelled() {
                return Ok(Flow::Terminate);
            }
            match source.read(ctx.poll_interval)? {
                SourceRead::Frame(image) => {
                    frame.image = Some(image);
                    frame.metadata.insert(meta::FRAME_INDEX, self.frame_index);
                    frame
                        .metadata
                        .insert(meta::TIMESTAMP_MS, chrono::Utc::now().timestamp_millis());
                    if let Some(rate) = source.frame_rate() {
                        frame.metadata.insert(meta::FRAME_RATE, rate);
                    }
                    self.frame_index += 1;
                    return Ok(Flow::Continue(frame));
                }
                SourceRead::Pending => continue,
                SourceRead::End => {
                    info!(
                        "{} reached end of stream after {} frames",
                        source.describe(),
                        self.frame_index
                    );
                    return Ok(Flow::Terminate);
                }
            }
        }
    }
}
