//! Sink handing the pass's signal to the network publisher

use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use posepipe_bridge::{BridgeError, Publisher};
use posepipe_core::{meta, Error, FrameData, Result};
use tracing::debug;

pub const KIND: &str = "signal_publisher";

/// Publishes `signal` once per pass that carries one. Peers coming and going
/// never affect the pipeline; only a shut down publisher fails the pass.
pub struct SignalPublisher {
    base: TransformerBase,
    publisher: Publisher,
}

impl SignalPublisher {
    pub fn new(publisher: Publisher) -> Self {
        Self {
            base: TransformerBase::new(KIND, "Signal Publisher"),
            publisher,
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: KIND,
            description: "Sends the signal to every connected subscriber",
            role: Role::Sink,
            parameters: Vec::new(),
        }
    }

    pub fn create(ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        let publisher = ctx.publisher.clone().ok_or_else(|| {
            Error::config("signal_publisher needs a listening publisher in the build context")
        })?;
        Ok(Box::new(Self::new(publisher)))
    }
}

impl Transformer for SignalPublisher {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn role(&self) -> Role {
        Role::Sink
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        let Some(value) = frame.signal() else {
            return Ok(Flow::Continue(frame));
        };
        let record = self.publisher.publish(value).map_err(|e| match e {
            BridgeError::Closed => Error::resource("Signal publisher is shut down"),
            other => Error::transform(other),
        })?;
        debug!(
            "Published #{} = {:.3} to {} peers",
            record.sequence,
            record.value,
            self.publisher.peer_count()
        );
        frame.metadata.insert(meta::SIGNAL_SEQUENCE, record.sequence);
        Ok(Flow::Continue(frame))
    }
}
