//! Structural editing of a root pipeline, addressed by transformer id

use crate::layout::{PipelineSnapshot, PipelineSpec, StageSpec, TransformerSnapshot};
use crate::param::ParamValue;
use crate::pipeline::Pipeline;
use crate::registry::{BuildContext, TransformerRegistry};
use crate::transformer::Transformer;
use posepipe_core::{Error, Result, TransformerId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the root pipeline and applies the control surface's edits to it.
/// Every failed edit leaves the tree exactly as it was.
pub struct PipelineEditor {
    root: Pipeline,
    registry: Arc<TransformerRegistry>,
    ctx: BuildContext,
}

impl PipelineEditor {
    pub fn new(registry: Arc<TransformerRegistry>, ctx: BuildContext) -> Self {
        Self {
            root: Pipeline::new("Pipeline"),
            registry,
            ctx,
        }
    }

    pub fn root(&self) -> &Pipeline {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Pipeline {
        &mut self.root
    }

    pub fn root_id(&self) -> TransformerId {
        self.root.id().clone()
    }

    pub fn registry(&self) -> &Arc<TransformerRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Replace the whole tree with one built from `spec`. The root keeps its
    /// id; nothing changes if any stage fails to build.
    pub fn build(&mut self, spec: &PipelineSpec) -> Result<()> {
        let name = spec.name.clone().unwrap_or_else(|| self.root.name().to_string());
        let mut root = Pipeline::with_id(self.root.id().clone(), name);
        for stage in &spec.stages {
            root.push(self.build_stage(stage)?)?;
        }

        self.root.close();
        self.root = root;
        info!(
            "Built pipeline '{}' with {} stages",
            self.root.name(),
            self.root.len()
        );
        Ok(())
    }

    fn build_stage(&self, stage: &StageSpec) -> Result<Box<dyn Transformer>> {
        let mut transformer = self.registry.create(&stage.kind, &self.ctx)?;
        if let Some(name) = &stage.name {
            transformer.base_mut().name = name.clone();
        }
        transformer.set_enabled(stage.enabled);
        for (name, value) in &stage.params {
            transformer.set_parameter(name, value.clone())?;
        }

        if !stage.members.is_empty() {
            let pipeline = transformer.as_pipeline_mut().ok_or_else(|| {
                Error::config(format!("'{}' cannot have members", stage.kind))
            })?;
            for member in &stage.members {
                pipeline.push(self.build_stage(member)?)?;
            }
        }
        Ok(transformer)
    }

    /// Create a `kind` transformer and insert it into `pipeline` at
    /// `position` (appended when `None`)
    pub fn add_transformer(
        &mut self,
        pipeline: &TransformerId,
        kind: &str,
        position: Option<usize>,
    ) -> Result<TransformerId> {
        let member = self.registry.create(kind, &self.ctx)?;
        self.insert(pipeline, member, position)
    }

    /// Insert an already constructed transformer. Its ids must not occur
    /// anywhere in the tree yet.
    pub fn insert(
        &mut self,
        pipeline: &TransformerId,
        member: Box<dyn Transformer>,
        position: Option<usize>,
    ) -> Result<TransformerId> {
        let existing: HashSet<TransformerId> = self.root.subtree_ids().into_iter().collect();
        if let Some(dup) = subtree_of(member.as_ref()).find(|id| existing.contains(id)) {
            return Err(Error::config(format!(
                "Cannot add '{}': {} is already part of the pipeline",
                member.name(),
                dup.short()
            )));
        }

        let target = self.pipeline_mut(pipeline)?;
        let position = position.unwrap_or(target.len());
        let id = member.id().clone();
        let name = member.name().to_string();
        target.insert(position, member)?;
        info!("Added '{}' to '{}' at {}", name, target.name(), position);
        Ok(id)
    }

    /// Remove the member at `index` of `pipeline`, closing it
    pub fn remove_transformer(
        &mut self,
        pipeline: &TransformerId,
        index: usize,
    ) -> Result<Box<dyn Transformer>> {
        let target = self.pipeline_mut(pipeline)?;
        let removed = target.remove(index)?;
        info!("Removed '{}' from '{}'", removed.name(), target.name());
        Ok(removed)
    }

    pub fn move_transformer(&mut self, pipeline: &TransformerId, from: usize, to: usize) -> Result<()> {
        let target = self.pipeline_mut(pipeline)?;
        target.move_member(from, to)?;
        debug!("Moved member {} to {} in '{}'", from, to, target.name());
        Ok(())
    }

    /// Move `member` (with its subtree) into the pipeline `into`. Rejected
    /// when `into` is `member` itself or lies below it.
    pub fn nest(
        &mut self,
        member: &TransformerId,
        into: &TransformerId,
        position: Option<usize>,
    ) -> Result<()> {
        if member == self.root.id() {
            return Err(Error::config("The root pipeline cannot be nested"));
        }
        let moving = self
            .root
            .find(member)
            .ok_or_else(|| unknown(member))?;
        if subtree_of(moving).any(|id| &id == into) {
            return Err(Error::config(format!(
                "Cannot nest '{}' into itself or one of its own members",
                moving.name()
            )));
        }
        let moving_name = moving.name().to_string();

        let target = self
            .root
            .find(into)
            .ok_or_else(|| unknown(into))?
            .as_pipeline()
            .ok_or_else(|| Error::config(format!("{} is not a pipeline", into.short())))?;
        let len_after = target.len() - usize::from(target.position(member).is_some());
        let position = position.unwrap_or(len_after);
        if position > len_after {
            return Err(Error::config(format!(
                "Position {} out of range for '{}' with {} members",
                position,
                target.name(),
                len_after
            )));
        }

        let taken = self.root.take(member).ok_or_else(|| unknown(member))?;
        self.pipeline_mut(into)?.insert(position, taken)?;
        info!("Nested '{}' into {} at {}", moving_name, into.short(), position);
        Ok(())
    }

    pub fn set_parameter(&mut self, id: &TransformerId, name: &str, value: ParamValue) -> Result<()> {
        let transformer = self.root.find_mut(id).ok_or_else(|| unknown(id))?;
        transformer.set_parameter(name, value.clone())?;
        debug!("'{}'.{} = {}", transformer.name(), name, value);
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &TransformerId, enabled: bool) -> Result<()> {
        let transformer = self.root.find_mut(id).ok_or_else(|| unknown(id))?;
        transformer.set_enabled(enabled);
        Ok(())
    }

    pub fn describe(&self) -> PipelineSnapshot {
        TransformerSnapshot::capture(&self.root)
    }

    fn pipeline_mut(&mut self, id: &TransformerId) -> Result<&mut Pipeline> {
        self.root
            .find_pipeline_mut(id)
            .ok_or_else(|| Error::config(format!("No pipeline with id {}", id)))
    }
}

fn unknown(id: &TransformerId) -> Error {
    Error::config(format!("No transformer with id {}", id))
}

fn subtree_of(transformer: &dyn Transformer) -> impl Iterator<Item = TransformerId> {
    let ids = match transformer.as_pipeline() {
        Some(pipeline) => pipeline.subtree_ids(),
        None => vec![transformer.id().clone()],
    };
    ids.into_iter()
}
