//! posepipe-pipeline: composable transformers and the driver that runs them
//!
//! A [`Pipeline`] is itself a [`Transformer`], so pipelines nest. The
//! [`StreamDriver`] owns one root pipeline on a worker thread and pulls a
//! fresh [`FrameData`](posepipe_core::FrameData) through it once per pass.

pub mod config;
pub mod driver;
pub mod editor;
pub mod layout;
pub mod model;
pub mod param;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod transformer;
pub mod transformers;

pub use config::StreamConfig;
pub use driver::{DriverState, StreamDriver, StreamEvent};
pub use editor::PipelineEditor;
pub use layout::{PipelineSnapshot, PipelineSpec, StageSpec, TransformerSnapshot};
pub use model::{KeypointModel, ModelRegistry};
pub use param::{ParamKind, ParamSpec, ParamValue};
pub use pipeline::Pipeline;
pub use registry::{BuildContext, KindInfo, TransformerRegistry};
pub use source::{DirectorySource, FrameSource, SourceRead, SyntheticSource};
pub use transformer::{CancelToken, Flow, PassContext, Role, Transformer, TransformerBase};
