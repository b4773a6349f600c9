//! Ordered, nestable composition of transformers

use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use posepipe_core::{Error, FrameData, Result, TransformerId};
use std::collections::HashSet;
use tracing::{debug, info};

pub const KIND: &str = "pipeline";

/// A pipeline exclusively owns its members and is itself a transformer.
/// Members never reference their parent.
pub struct Pipeline {
    base: TransformerBase,
    members: Vec<Box<dyn Transformer>>,
    open: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", self.id())
            .field("name", &self.name())
            .field(
                "members",
                &self.members.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: TransformerBase::new(KIND, name),
            members: Vec::new(),
            open: false,
        }
    }

    pub fn with_id(id: TransformerId, name: impl Into<String>) -> Self {
        let mut pipeline = Self::new(name);
        pipeline.base.id = id;
        pipeline
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Box<dyn Transformer>] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<&dyn Transformer> {
        self.members.get(index).map(|m| m.as_ref())
    }

    /// Append a member
    pub fn push(&mut self, member: Box<dyn Transformer>) -> Result<()> {
        let index = self.members.len();
        self.insert(index, member)
    }

    /// Insert a member at `index`. Rejected when any transformer of the new
    /// member's subtree is already part of this one, which is also how a
    /// pipeline containing itself is ruled out.
    pub fn insert(&mut self, index: usize, member: Box<dyn Transformer>) -> Result<()> {
        if index > self.members.len() {
            return Err(Error::config(format!(
                "Position {} out of range for '{}' with {} members",
                index,
                self.name(),
                self.members.len()
            )));
        }

        let existing: HashSet<TransformerId> = self.subtree_ids().into_iter().collect();
        if let Some(dup) = subtree_ids(member.as_ref())
            .into_iter()
            .find(|id| existing.contains(id))
        {
            return Err(Error::config(format!(
                "Cannot insert '{}' into '{}': {} is already part of the pipeline",
                member.name(),
                self.name(),
                dup.short()
            )));
        }

        debug!("Inserting '{}' into '{}' at {}", member.name(), self.name(), index);
        self.members.insert(index, member);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Box<dyn Transformer>> {
        if index >= self.members.len() {
            return Err(Error::config(format!(
                "No member at position {} in '{}' ({} members)",
                index,
                self.name(),
                self.members.len()
            )));
        }
        let mut removed = self.members.remove(index);
        removed.close();
        debug!("Removed '{}' from '{}'", removed.name(), self.name());
        Ok(removed)
    }

    /// Move the member at `from` so it ends up at `to`
    pub fn move_member(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.members.len();
        if from >= len || to >= len {
            return Err(Error::config(format!(
                "Cannot move member {} to {} in '{}' ({} members)",
                from,
                to,
                self.name(),
                len
            )));
        }
        let member = self.members.remove(from);
        self.members.insert(to, member);
        Ok(())
    }

    /// Index of a direct member
    pub fn position(&self, id: &TransformerId) -> Option<usize> {
        self.members.iter().position(|m| m.id() == id)
    }

    /// True when `id` is this pipeline or anywhere below it
    pub fn contains(&self, id: &TransformerId) -> bool {
        self.find(id).is_some()
    }

    pub fn find(&self, id: &TransformerId) -> Option<&dyn Transformer> {
        if self.id() == id {
            return Some(self);
        }
        for member in &self.members {
            if member.id() == id {
                return Some(member.as_ref());
            }
            if let Some(found) = member.as_pipeline().and_then(|p| p.find(id)) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_mut(&mut self, id: &TransformerId) -> Option<&mut dyn Transformer> {
        if self.id() == id {
            return Some(self);
        }
        for member in self.members.iter_mut() {
            if member.id() == id {
                return Some(member.as_mut());
            }
            if let Some(found) = member.as_pipeline_mut().and_then(|p| p.find_mut(id)) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_pipeline_mut(&mut self, id: &TransformerId) -> Option<&mut Pipeline> {
        self.find_mut(id).and_then(|t| t.as_pipeline_mut())
    }

    /// Detach `id` from wherever it sits below this pipeline
    pub fn take(&mut self, id: &TransformerId) -> Option<Box<dyn Transformer>> {
        if let Some(index) = self.position(id) {
            return Some(self.members.remove(index));
        }
        for member in self.members.iter_mut() {
            if let Some(taken) = member.as_pipeline_mut().and_then(|p| p.take(id)) {
                return Some(taken);
            }
        }
        None
    }

    /// Ids of this pipeline and every transformer below it
    pub fn subtree_ids(&self) -> Vec<TransformerId> {
        subtree_ids(self)
    }

    /// Whether an enabled member anywhere below produces frames
    pub fn has_source(&self) -> bool {
        self.members.iter().filter(|m| m.is_enabled()).any(|m| {
            m.role() == Role::Source || m.as_pipeline().map(Pipeline::has_source).unwrap_or(false)
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

fn subtree_ids(root: &dyn Transformer) -> Vec<TransformerId> {
    let mut ids = vec![root.id().clone()];
    if let Some(pipeline) = root.as_pipeline() {
        for member in pipeline.members() {
            ids.extend(subtree_ids(member.as_ref()));
        }
    }
    ids
}

impl Transformer for Pipeline {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn transform(&mut self, mut frame: FrameData, ctx: &PassContext) -> Result<Flow> {
        for member in self.members.iter_mut() {
            if !member.is_enabled() {
                continue;
            }
            let flow = member
                .transform(frame, ctx)
                .map_err(|e| e.attribute(member.id(), member.name()))?;
            match flow {
                Flow::Continue(next) => frame = next,
                Flow::Terminate => {
                    debug!("'{}' terminated pass {}", member.name(), ctx.pass_index);
                    return Ok(Flow::Terminate);
                }
            }
        }
        Ok(Flow::Continue(frame))
    }

    /// Open members in order; on failure, members already opened are closed
    /// again before the error is returned.
    fn open(&mut self) -> Result<()> {
        for index in 0..self.members.len() {
            let member = &mut self.members[index];
            if let Err(e) = member.open() {
                // Nested pipelines have already named the failing member
                let e = if member.as_pipeline().is_some() {
                    e
                } else {
                    e.in_member(member.name())
                };
                let e = e.attribute(member.id(), member.name());
                for opened in self.members[..index].iter_mut().rev() {
                    opened.close();
                }
                return Err(e);
            }
        }
        self.open = true;
        info!("Opened pipeline '{}' ({} members)", self.name(), self.members.len());
        Ok(())
    }

    fn close(&mut self) {
        for member in self.members.iter_mut().rev() {
            member.close();
        }
        if self.open {
            info!("Closed pipeline '{}'", self.name());
        }
        self.open = false;
    }

    fn as_pipeline(&self) -> Option<&Pipeline> {
        Some(self)
    }

    fn as_pipeline_mut(&mut self) -> Option<&mut Pipeline> {
        Some(self)
    }
}
