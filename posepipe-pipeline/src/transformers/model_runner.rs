//! Detector transformer running a keypoint model on every frame

use crate::model::{KeypointModel, ModelRegistry, BRIGHT_SPOT};
use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use posepipe_core::{Error, FrameData, Result};
use std::sync::Arc;
use tracing::info;

pub const KIND: &str = "model_runner";

pub struct ModelRunner {
    base: TransformerBase,
    models: Arc<ModelRegistry>,
    model_name: String,
    model: Box<dyn KeypointModel>,
}

impl ModelRunner {
    pub fn new(models: Arc<ModelRegistry>, model_name: &str) -> Result<Self> {
        let model = models.create(model_name)?;
        Ok(Self {
            base: TransformerBase::new(KIND, "Model Runner"),
            models,
            model_name: model_name.to_string(),
            model,
        })
    }

    /// Run a model instance that is not in the registry
    pub fn with_model(model: Box<dyn KeypointModel>) -> Self {
        Self {
            base: TransformerBase::new(KIND, "Model Runner"),
            models: Arc::new(ModelRegistry::new()),
            model_name: model.name().to_string(),
            model,
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: KIND,
            description: "Runs a keypoint model and replaces the frame's keypoints",
            role: Role::Interior,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(ctx.models.clone(), BRIGHT_SPOT)?))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![ParamSpec::text("model", "Registered keypoint model name")]
    }
}

impl Transformer for ModelRunner {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Self::param_specs()
    }

    fn get_parameter(&self, name: &str) -> Option<ParamValue> {
        (name == "model").then(|| self.model_name.clone().into())
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let model_name = value
            .as_text()
            .filter(|_| name == "model")
            .ok_or_else(|| Error::config(format!("'{}' has no parameter '{}'", self.name(), name)))?;
        // Constructed before anything is replaced so a bad name changes nothing
        let model = self.models.create(model_name)?;
        info!("'{}' now runs model '{}'", self.name(), model_name);
        self.model_name = model_name.to_string();
        self.model = model;
        Ok(())
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        let image = frame
            .image
            .as_ref()
            .ok_or_else(|| Error::transform("No image to run the model on"))?;
        let keypoints = self.model.detect(image)?;
        frame.set_keypoints(keypoints);
        Ok(Flow::Continue(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use posepipe_core::{ErrorKind, Landmark};

    fn runner() -> ModelRunner {
        ModelRunner::new(Arc::new(ModelRegistry::with_builtins()), BRIGHT_SPOT).unwrap()
    }

    #[test]
    fn test_runner_populates_keypoints() {
        let mut image = RgbaImage::new(10, 10);
        image.put_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let out = runner()
            .transform(FrameData::with_image(image), &PassContext::default())
            .unwrap()
            .into_frame()
            .unwrap();
        let keypoints = out.keypoints.unwrap();
        assert!(keypoints.landmark(Landmark::RightWrist).unwrap().confidence > 0.0);
    }

    #[test]
    fn test_missing_image_is_transform_error() {
        let err = runner()
            .transform(FrameData::new(), &PassContext::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transform);
    }

    #[test]
    fn test_unknown_model_keeps_current() {
        let mut runner = runner();
        assert!(runner.set_parameter("model", "openpose".into()).is_err());
        assert_eq!(runner.get_parameter("model"), Some(BRIGHT_SPOT.into()));
    }
}
