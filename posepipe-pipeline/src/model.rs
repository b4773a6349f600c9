//! Keypoint model contract and the registry of available models

use image::RgbaImage;
use parking_lot::RwLock;
use posepipe_core::{Error, Keypoint, KeypointSet, Landmark, Result, SkeletonTopology};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A pose estimator. Given one frame it returns a fixed-length keypoint set
/// in its own topology. An undetectable frame yields a set with all
/// confidences at zero rather than an error.
pub trait KeypointModel: Send {
    fn name(&self) -> &str;

    fn topology(&self) -> Arc<SkeletonTopology>;

    fn detect(&mut self, image: &RgbaImage) -> Result<KeypointSet>;
}

pub type ModelFactory = fn() -> Box<dyn KeypointModel>;

/// Name to constructor lookup for keypoint models, consulted when a model
/// runner is configured, never while streaming
pub struct ModelRegistry {
    factories: RwLock<HashMap<String, ModelFactory>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(BRIGHT_SPOT, || -> Box<dyn KeypointModel> {
            Box::new(BrightSpotModel::default())
        });
        registry
    }

    pub fn register(&self, name: impl Into<String>, factory: ModelFactory) {
        let name = name.into();
        info!("Registered keypoint model: {}", name);
        self.factories.write().insert(name, factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn KeypointModel>> {
        self.factories
            .read()
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::config(format!("Unknown keypoint model '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

pub const BRIGHT_SPOT: &str = "bright_spot";

/// Pixels needed for full confidence
const FULL_CONFIDENCE_PIXELS: f32 = 9.0;

/// Tracks the brightest blob in the frame and reports it as the right wrist
/// of a MoveNet skeleton. Useful with a light marker held in the hand, and
/// with the synthetic source.
#[derive(Debug, Clone)]
pub struct BrightSpotModel {
    threshold: u8,
    topology: Arc<SkeletonTopology>,
}

impl BrightSpotModel {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            topology: SkeletonTopology::move_net(),
        }
    }
}

impl Default for BrightSpotModel {
    fn default() -> Self {
        Self::new(200)
    }
}

fn luminance(pixel: &image::Rgba<u8>) -> u32 {
    let [r, g, b, _] = pixel.0;
    (u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000
}

impl KeypointModel for BrightSpotModel {
    fn name(&self) -> &str {
        BRIGHT_SPOT
    }

    fn topology(&self) -> Arc<SkeletonTopology> {
        self.topology.clone()
    }

    fn detect(&mut self, image: &RgbaImage) -> Result<KeypointSet> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::transform("Cannot detect keypoints on an empty image"));
        }

        let (mut sum_x, mut sum_y, mut count) = (0u64, 0u64, 0u64);
        for (x, y, pixel) in image.enumerate_pixels() {
            if luminance(pixel) >= u32::from(self.threshold) {
                sum_x += u64::from(x);
                sum_y += u64::from(y);
                count += 1;
            }
        }

        let empty = KeypointSet::empty(self.topology.clone());
        if count == 0 {
            return Ok(empty);
        }

        let index = self
            .topology
            .index_of(Landmark::RightWrist)
            .ok_or_else(|| Error::transform("Topology has no right wrist"))?;
        let mut keypoints = empty.keypoints().to_vec();
        keypoints[index] = Keypoint::new(
            (sum_y as f32 / count as f32 + 0.5) / height as f32,
            (sum_x as f32 / count as f32 + 0.5) / width as f32,
            0.0,
            (count as f32 / FULL_CONFIDENCE_PIXELS).min(1.0),
        );
        KeypointSet::new(keypoints, self.topology.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_dark_frame_yields_zero_confidence() {
        let mut model = BrightSpotModel::default();
        let set = model.detect(&RgbaImage::new(8, 8)).unwrap();
        assert_eq!(set.len(), 17);
        assert!(!set.is_detected(0.01));
    }

    #[test]
    fn test_bright_pixel_becomes_right_wrist() {
        let mut image = RgbaImage::new(10, 20);
        image.put_pixel(4, 9, Rgba([255, 255, 255, 255]));
        let mut model = BrightSpotModel::default();
        let set = model.detect(&image).unwrap();

        let wrist = set.landmark(Landmark::RightWrist).unwrap();
        assert!((wrist.x - 0.45).abs() < 1e-6);
        assert!((wrist.y - 0.475).abs() < 1e-6);
        assert!(wrist.confidence > 0.0);
        assert_eq!(set.landmark(Landmark::Nose).unwrap().confidence, 0.0);
    }

    #[test]
    fn test_empty_image_is_transform_error() {
        let mut model = BrightSpotModel::default();
        let err = model.detect(&RgbaImage::new(0, 0)).unwrap_err();
        assert_eq!(err.kind(), posepipe_core::ErrorKind::Transform);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ModelRegistry::with_builtins();
        assert!(registry.contains(BRIGHT_SPOT));
        assert_eq!(registry.create(BRIGHT_SPOT).unwrap().name(), BRIGHT_SPOT);
        assert!(registry.create("blazepose").is_err());
        assert_eq!(registry.names(), vec![BRIGHT_SPOT.to_string()]);
    }
}
