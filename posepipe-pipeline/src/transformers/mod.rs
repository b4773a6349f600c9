//! Built-in transformer kinds

pub mod drawing;
pub mod image_ops;
pub mod metrics;
pub mod min_max;
pub mod model_runner;
pub mod recorder;
pub mod replay;
pub mod signal_publisher;
pub mod video_source;

pub use drawing::{LandmarkDrawer, SkeletonDrawer};
pub use image_ops::{Mirror, Scaler};
pub use metrics::{Derivative, MetricExtractor, SlidingAverage};
pub use min_max::{Input, MinMaxSelector};
pub use model_runner::ModelRunner;
pub use recorder::{FrameRecorder, KeypointRecorder, MetricSample, MetricsRecorder};
pub use replay::KeypointReplay;
pub use signal_publisher::SignalPublisher;
pub use video_source::VideoSource;

use crate::pipeline::{self, Pipeline};
use crate::registry::{BuildContext, KindInfo, TransformerRegistry};
use crate::transformer::{Role, Transformer};
use posepipe_core::Result;

fn pipeline_info() -> KindInfo {
    KindInfo {
        kind: pipeline::KIND,
        description: "Runs its members in order; may be nested",
        role: Role::Interior,
        parameters: Vec::new(),
    }
}

fn create_pipeline(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
    Ok(Box::new(Pipeline::new("Pipeline")))
}

/// Register every built-in kind. Called once while the registry is built.
pub fn register_builtins(registry: &TransformerRegistry) -> Result<()> {
    registry.register(pipeline_info(), create_pipeline)?;
    registry.register(VideoSource::info(), VideoSource::create)?;
    registry.register(Mirror::info(), Mirror::create)?;
    registry.register(Scaler::info(), Scaler::create)?;
    registry.register(ModelRunner::info(), ModelRunner::create)?;
    registry.register(KeypointReplay::info(), KeypointReplay::create)?;
    registry.register(LandmarkDrawer::info(), LandmarkDrawer::create)?;
    registry.register(SkeletonDrawer::info(), SkeletonDrawer::create)?;
    registry.register(MetricExtractor::info(), MetricExtractor::create)?;
    registry.register(SlidingAverage::info(), SlidingAverage::create)?;
    registry.register(Derivative::info(), Derivative::create)?;
    registry.register(MinMaxSelector::info(), MinMaxSelector::create)?;
    registry.register(SignalPublisher::info(), SignalPublisher::create)?;
    registry.register(KeypointRecorder::info(), KeypointRecorder::create)?;
    registry.register(FrameRecorder::info(), FrameRecorder::create)?;
    registry.register(MetricsRecorder::info(), MetricsRecorder::create)?;
    Ok(())
}
