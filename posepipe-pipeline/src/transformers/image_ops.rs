//! Image-only transformers

use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use posepipe_core::{Error, FrameData, Result};
use std::sync::Arc;

pub const MIRROR: &str = "mirror";
pub const SCALER: &str = "scaler";

/// Flips the frame horizontally so the user sees themselves as in a mirror.
/// Keypoints already present are mirrored along with the image.
pub struct Mirror {
    base: TransformerBase,
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            base: TransformerBase::new(MIRROR, "Image Mirror"),
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: MIRROR,
            description: "Flips the image horizontally",
            role: Role::Interior,
            parameters: Vec::new(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new()))
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for Mirror {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        if let Some(image) = frame.image.as_mut() {
            imageops::flip_horizontal_in_place(image);
        }
        if let Some(keypoints) = frame.keypoints.take() {
            frame.keypoints = Some(Arc::new(keypoints.mirrored()));
        }
        Ok(Flow::Continue(frame))
    }
}

/// Fits the frame into `width` x `height`, keeping the aspect ratio and
/// padding the rest with black
pub struct Scaler {
    base: TransformerBase,
    width: i64,
    height: i64,
}

impl Scaler {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            base: TransformerBase::new(SCALER, "Scaler"),
            width: i64::from(width),
            height: i64::from(height),
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: SCALER,
            description: "Resizes the image with letterboxing",
            role: Role::Interior,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(256, 256)))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("width", "Target width in pixels").range(1.0, 8192.0),
            ParamSpec::int("height", "Target height in pixels").range(1.0, 8192.0),
        ]
    }
}

fn letterbox(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (src_w, src_h) = image.dimensions();
    if (src_w, src_h) == (width, height) {
        return image.clone();
    }
    let scale = f64::min(
        f64::from(width) / f64::from(src_w),
        f64::from(height) / f64::from(src_h),
    );
    let fit_w = ((f64::from(src_w) * scale).round() as u32).clamp(1, width);
    let fit_h = ((f64::from(src_h) * scale).round() as u32).clamp(1, height);
    let resized = imageops::resize(image, fit_w, fit_h, FilterType::Triangle);

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    let x = i64::from((width - fit_w) / 2);
    let y = i64::from((height - fit_h) / 2);
    imageops::overlay(&mut canvas, &resized, x, y);
    canvas
}

impl Transformer for Scaler {
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
        match name {
            "width" => Some(self.width.into()),
            "height" => Some(self.height.into()),
            _ => None,
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value.as_int()) {
            ("width", Some(v)) => self.width = v,
            ("height", Some(v)) => self.height = v,
            _ => {
                return Err(Error::config(format!(
                    "Cannot set '{}' to {} on '{}'",
                    name,
                    value,
                    self.name()
                )))
            }
        }
        Ok(())
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        if let Some(image) = frame.image.as_ref() {
            if image.width() == 0 || image.height() == 0 {
                return Err(Error::transform("Cannot scale an empty image"));
            }
            frame.image = Some(letterbox(image, self.width as u32, self.height as u32));
        }
        Ok(Flow::Continue(frame))
    }
}
