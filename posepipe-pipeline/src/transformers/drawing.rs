//! Overlay transformers drawing keypoints onto the frame

use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use posepipe_core::{Error, FrameData, Keypoint, Result};

pub const LANDMARK_DRAWER: &str = "landmark_drawer";
pub const SKELETON_DRAWER: &str = "skeleton_drawer";

/// Filled disc, clipped to the image
pub fn draw_disc(image: &mut RgbaImage, center: (i32, i32), radius: i32, color: Rgba<u8>) {
    draw_filled_circle_mut(image, center, radius, color);
}

/// Line segment `thickness` pixels wide with rounded ends
pub fn draw_line(
    image: &mut RgbaImage,
    from: (f32, f32),
    to: (f32, f32),
    thickness: i32,
    color: Rgba<u8>,
) {
    let radius = (thickness - 1) / 2;
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = dx.hypot(dy);
    if radius == 0 || length == 0.0 {
        draw_line_segment_mut(image, from, to, color);
    } else {
        // Half-pixel steps across the width leave no gaps on diagonals
        let (nx, ny) = (-dy / length, dx / length);
        for step in -2 * radius..=2 * radius {
            let offset = step as f32 * 0.5;
            draw_line_segment_mut(
                image,
                (from.0 + nx * offset, from.1 + ny * offset),
                (to.0 + nx * offset, to.1 + ny * offset),
                color,
            );
        }
    }
    if radius > 0 {
        let round = |(x, y): (f32, f32)| (x.round() as i32, y.round() as i32);
        draw_disc(image, round(from), radius, color);
        draw_disc(image, round(to), radius, color);
    }
}

fn to_pixel(keypoint: &Keypoint, image: &RgbaImage) -> (f32, f32) {
    (
        keypoint.x * image.width() as f32,
        keypoint.y * image.height() as f32,
    )
}

fn color_spec() -> ParamSpec {
    ParamSpec::color("color", "RGBA drawing color")
}

fn confidence_spec() -> ParamSpec {
    ParamSpec::float("min_confidence", "Skip keypoints below this confidence").range(0.0, 1.0)
}

/// Marks every sufficiently confident keypoint with a filled circle
pub struct LandmarkDrawer {
    base: TransformerBase,
    radius: i64,
    color: [u8; 4],
    min_confidence: f64,
}

impl LandmarkDrawer {
    pub fn new() -> Self {
        Self {
            base: TransformerBase::new(LANDMARK_DRAWER, "Landmark Drawer"),
            radius: 4,
            color: [0, 255, 0, 255],
            min_confidence: 0.3,
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: LANDMARK_DRAWER,
            description: "Draws a marker on every detected keypoint",
            role: Role::Interior,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new()))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("radius", "Marker radius in pixels").range(1.0, 50.0),
            color_spec(),
            confidence_spec(),
        ]
    }
}

impl Default for LandmarkDrawer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for LandmarkDrawer {
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
            "radius" => Some(self.radius.into()),
            "color" => Some(self.color.into()),
            "min_confidence" => Some(self.min_confidence.into()),
            _ => None,
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("radius", ParamValue::Int(v)) => self.radius = v,
            ("color", ParamValue::Color(c)) => self.color = c,
            ("min_confidence", ParamValue::Float(v)) => self.min_confidence = v,
            (name, value) => {
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
        if let (Some(image), Some(keypoints)) = (frame.image.as_mut(), frame.keypoints.as_ref()) {
            for keypoint in keypoints.keypoints() {
                if f64::from(keypoint.confidence) < self.min_confidence {
                    continue;
                }
                let (x, y) = to_pixel(keypoint, image);
                draw_disc(image, (x as i32, y as i32), self.radius as i32, Rgba(self.color));
            }
        }
        Ok(Flow::Continue(frame))
    }
}

/// Connects keypoints along the model's skeleton edges
pub struct SkeletonDrawer {
    base: TransformerBase,
    thickness: i64,
    color: [u8; 4],
    min_confidence: f64,
}

impl SkeletonDrawer {
    pub fn new() -> Self {
        Self {
            base: TransformerBase::new(SKELETON_DRAWER, "Skeleton Drawer"),
            thickness: 2,
            color: [255, 255, 255, 255],
            min_confidence: 0.3,
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: SKELETON_DRAWER,
            description: "Draws the skeleton edges between detected keypoints",
            role: Role::Interior,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new()))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("thickness", "Line thickness in pixels").range(1.0, 20.0),
            color_spec(),
            confidence_spec(),
        ]
    }
}

impl Default for SkeletonDrawer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for SkeletonDrawer {
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
            "thickness" => Some(self.thickness.into()),
            "color" => Some(self.color.into()),
            "min_confidence" => Some(self.min_confidence.into()),
            _ => None,
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("thickness", ParamValue::Int(v)) => self.thickness = v,
            ("color", ParamValue::Color(c)) => self.color = c,
            ("min_confidence", ParamValue::Float(v)) => self.min_confidence = v,
            (name, value) => {
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
        if let (Some(image), Some(keypoints)) = (frame.image.as_mut(), frame.keypoints.as_ref()) {
            for &(a, b) in keypoints.topology().edges() {
                let (Some(ka), Some(kb)) = (keypoints.get(a), keypoints.get(b)) else {
                    continue;
                };
                if f64::from(ka.confidence.min(kb.confidence)) < self.min_confidence {
                    continue;
                }
                let from = to_pixel(ka, image);
                let to = to_pixel(kb, image);
                draw_line(image, from, to, self.thickness as i32, Rgba(self.color));
            }
        }
        Ok(Flow::Continue(frame))
    }
}
