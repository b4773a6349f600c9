//! Keypoints and keypoint sets produced by pose models

use crate::error::{Error, Result};
use crate::topology::{Landmark, SkeletonTopology};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One estimated landmark; all components normalized
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub y: f32,
    pub x: f32,
    pub z: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(y: f32, x: f32, z: f32, confidence: f32) -> Self {
        Self { y, x, z, confidence }
    }

    /// Look up a component by name (`x`, `y`, `z`, `confidence`)
    pub fn component(&self, name: &str) -> Option<f32> {
        match name {
            "x" => Some(self.x),
            "y" => Some(self.y),
            "z" => Some(self.z),
            "confidence" => Some(self.confidence),
            _ => None,
        }
    }

    fn as_array(&self) -> [f32; 4] {
        [self.y, self.x, self.z, self.confidence]
    }
}

impl From<[f32; 4]> for Keypoint {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Fixed-length keypoint collection for one frame. Shared behind an `Arc`
/// once produced; replacing keypoints means building a new set.
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointSet {
    keypoints: Vec<Keypoint>,
    topology: Arc<SkeletonTopology>,
}

impl KeypointSet {
    pub fn new(keypoints: Vec<Keypoint>, topology: Arc<SkeletonTopology>) -> Result<Self> {
        if keypoints.len() != topology.size() {
            return Err(Error::transform(format!(
                "Topology '{}' expects {} keypoints, got {}",
                topology.name(),
                topology.size(),
                keypoints.len()
            )));
        }
        Ok(Self { keypoints, topology })
    }

    /// The "no detection" result: every confidence is zero
    pub fn empty(topology: Arc<SkeletonTopology>) -> Self {
        Self {
            keypoints: vec![Keypoint::default(); topology.size()],
            topology,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn get(&self, index: usize) -> Option<&Keypoint> {
        self.keypoints.get(index)
    }

    pub fn topology(&self) -> &Arc<SkeletonTopology> {
        &self.topology
    }

    /// Resolve a common landmark through the model's index scheme
    pub fn landmark(&self, landmark: Landmark) -> Option<Keypoint> {
        self.topology
            .index_of(landmark)
            .and_then(|idx| self.keypoints.get(idx).copied())
    }

    pub fn max_confidence(&self) -> f32 {
        self.keypoints
            .iter()
            .map(|k| k.confidence)
            .fold(0.0, f32::max)
    }

    pub fn is_detected(&self, threshold: f32) -> bool {
        self.max_confidence() >= threshold
    }

    /// Copy with every x coordinate mirrored around the vertical axis
    pub fn mirrored(&self) -> Self {
        Self {
            keypoints: self
                .keypoints
                .iter()
                .map(|k| Keypoint { x: 1.0 - k.x, ..*k })
                .collect(),
            topology: self.topology.clone(),
        }
    }

    pub fn to_record(&self) -> KeypointRecord {
        KeypointRecord {
            topology: self.topology.name().to_string(),
            keypoints: self.keypoints.iter().map(Keypoint::as_array).collect(),
        }
    }

    pub fn from_record(record: KeypointRecord) -> Result<Self> {
        let topology = SkeletonTopology::by_name(&record.topology).ok_or_else(|| {
            Error::transform(format!("Unknown topology '{}' in record", record.topology))
        })?;
        Self::new(
            record.keypoints.into_iter().map(Keypoint::from).collect(),
            topology,
        )
    }
}

/// Serialized form of a keypoint set, one per line in recordings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointRecord {
    pub topology: String,
    pub keypoints: Vec<[f32; 4]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_length() {
        let topology = SkeletonTopology::move_net();
        assert!(KeypointSet::new(vec![Keypoint::default(); 3], topology.clone()).is_err());
        assert!(KeypointSet::new(vec![Keypoint::default(); 17], topology).is_ok());
    }

    #[test]
    fn test_empty_is_not_detected() {
        let set = KeypointSet::empty(SkeletonTopology::blaze_pose());
        assert_eq!(set.len(), 33);
        assert_eq!(set.max_confidence(), 0.0);
        assert!(!set.is_detected(0.1));
    }

    #[test]
    fn test_landmark_lookup_differs_per_model() {
        let mut points = vec![Keypoint::default(); 17];
        points[10] = Keypoint::new(0.2, 0.7, 0.0, 0.9);
        let movenet = KeypointSet::new(points, SkeletonTopology::move_net()).unwrap();
        assert_eq!(movenet.landmark(Landmark::RightWrist).unwrap().x, 0.7);

        let mut points = vec![Keypoint::default(); 33];
        points[16] = Keypoint::new(0.2, 0.3, 0.0, 0.8);
        let blaze = KeypointSet::new(points, SkeletonTopology::blaze_pose()).unwrap();
        assert_eq!(blaze.landmark(Landmark::RightWrist).unwrap().x, 0.3);
    }

    #[test]
    fn test_mirrored_leaves_original_untouched() {
        let mut points = vec![Keypoint::default(); 17];
        points[0] = Keypoint::new(0.5, 0.25, 0.1, 1.0);
        let set = KeypointSet::new(points, SkeletonTopology::move_net()).unwrap();
        let mirrored = set.mirrored();
        assert_eq!(mirrored.get(0).unwrap().x, 0.75);
        assert_eq!(set.get(0).unwrap().x, 0.25);
        assert_eq!(mirrored.get(0).unwrap().z, 0.1);
    }

    #[test]
    fn test_record_restores_set() {
        let mut points = vec![Keypoint::default(); 17];
        points[5] = Keypoint::new(0.4, 0.6, 0.0, 0.5);
        let set = KeypointSet::new(points, SkeletonTopology::move_net()).unwrap();
        let line = serde_json::to_string(&set.to_record()).unwrap();
        let record: KeypointRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(KeypointSet::from_record(record).unwrap(), set);
    }

    #[test]
    fn test_component_lookup() {
        let k = Keypoint::new(0.1, 0.2, 0.3, 0.4);
        assert_eq!(k.component("confidence"), Some(0.4));
        assert_eq!(k.component("y"), Some(0.1));
        assert_eq!(k.component("w"), None);
    }

    proptest::proptest! {
        #[test]
        fn test_mirroring_twice_restores_positions(
            xs in proptest::collection::vec(0.0f32..=1.0, 17),
        ) {
            let points = xs.iter().map(|x| Keypoint::new(0.5, *x, 0.0, 1.0)).collect();
            let set = KeypointSet::new(points, SkeletonTopology::move_net()).unwrap();
            let back = set.mirrored().mirrored();
            for (a, b) in set.keypoints().iter().zip(back.keypoints()) {
                proptest::prop_assert!((a.x - b.x).abs() < 1e-6);
                proptest::prop_assert_eq!(a.confidence, b.confidence);
            }
        }
    }
}
