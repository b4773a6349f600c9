//! The transformer contract

use crate::param::{self, ParamSpec, ParamValue};
use crate::pipeline::Pipeline;
use posepipe_core::{FrameData, Result, TransformerId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of one transform call
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Hand the (possibly modified) frame to the next member
    Continue(FrameData),
    /// End the stream; later members are not invoked for this pass
    Terminate,
}

impl Flow {
    pub fn is_terminate(&self) -> bool {
        matches!(self, Flow::Terminate)
    }

    pub fn into_frame(self) -> Option<FrameData> {
        match self {
            Flow::Continue(frame) => Some(frame),
            Flow::Terminate => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Produces frames; a pipeline needs one to be started
    Source,
    Interior,
    Sink,
}

/// Shared stop request observed by long-running transform calls
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-pass context handed to every member
#[derive(Debug, Clone)]
pub struct PassContext {
    pub pass_index: u64,
    pub cancel: CancelToken,
    /// Upper bound on a single blocking wait inside a transform call
    pub poll_interval: Duration,
}

impl PassContext {
    pub fn new(pass_index: u64, cancel: CancelToken, poll_interval: Duration) -> Self {
        Self {
            pass_index,
            cancel,
            poll_interval,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for PassContext {
    fn default() -> Self {
        Self::new(0, CancelToken::new(), Duration::from_millis(100))
    }
}

/// Identity and enable flag every transformer carries
#[derive(Debug, Clone)]
pub struct TransformerBase {
    pub id: TransformerId,
    pub name: String,
    pub kind: &'static str,
    pub enabled: bool,
}

impl TransformerBase {
    pub fn new(kind: &'static str, name: impl Into<String>) -> Self {
        Self {
            id: TransformerId::generate(),
            name: name.into(),
            kind,
            enabled: true,
        }
    }
}

/// One composable processing step.
///
/// Implementations keep their accumulated state (smoothing buffers, open
/// files, sockets) in their own fields; the `FrameData` they receive is
/// fresh for every pass and must not be retained.
pub trait Transformer: Send {
    fn base(&self) -> &TransformerBase;

    fn base_mut(&mut self) -> &mut TransformerBase;

    fn transform(&mut self, frame: FrameData, ctx: &PassContext) -> Result<Flow>;

    fn id(&self) -> &TransformerId {
        &self.base().id
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn kind(&self) -> &'static str {
        self.base().kind
    }

    fn role(&self) -> Role {
        Role::Interior
    }

    fn is_enabled(&self) -> bool {
        self.base().enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.base().enabled != enabled {
            debug!("{} '{}' enabled = {}", self.kind(), self.name(), enabled);
        }
        self.base_mut().enabled = enabled;
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn get_parameter(&self, _name: &str) -> Option<ParamValue> {
        None
    }

    /// Store an already validated value. Must either apply completely or
    /// return an error leaving the previous value in place.
    fn apply_parameter(&mut self, name: &str, _value: ParamValue) -> Result<()> {
        Err(posepipe_core::Error::config(format!(
            "'{}' has no parameter '{}'",
            self.name(),
            name
        )))
    }

    /// Validate and set a parameter; on failure the previous value stays
    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let specs = self.parameters();
        let spec = param::lookup(&specs, name, self.name())?;
        let value = spec.validate(value)?;
        self.apply_parameter(name, value)
    }

    /// Acquire resources before the first pass
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release resources. Called once per run on every exit path; must be
    /// safe to call again.
    fn close(&mut self) {}

    fn as_pipeline(&self) -> Option<&Pipeline> {
        None
    }

    fn as_pipeline_mut(&mut self) -> Option<&mut Pipeline> {
        None
    }
}
