//! The per-pass data envelope

use crate::keypoint::KeypointSet;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Well-known metadata keys
pub mod meta {
    pub const FRAME_INDEX: &str = "frame_index";
    pub const TIMESTAMP_MS: &str = "timestamp_ms";
    pub const FRAME_RATE: &str = "frame_rate";
    pub const SIGNAL: &str = "signal";
    pub const SIGNAL_SEQUENCE: &str = "signal_sequence";
    pub const METRIC_PREFIX: &str = "metric.";
    pub const METRIC_MIN_PREFIX: &str = "metric_min.";
    pub const METRIC_MAX_PREFIX: &str = "metric_max.";
}

/// Opaque key/value metadata attached to one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_metric(&mut self, name: &str, value: f64) {
        self.insert(format!("{}{}", meta::METRIC_PREFIX, name), value);
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.get_f64(&format!("{}{}", meta::METRIC_PREFIX, name))
    }

    /// Record the calibrated range a metric is normalized against
    pub fn set_metric_bounds(&mut self, name: &str, min: f64, max: f64) {
        self.insert(format!("{}{}", meta::METRIC_MIN_PREFIX, name), min);
        self.insert(format!("{}{}", meta::METRIC_MAX_PREFIX, name), max);
    }

    /// `(min, max)` for `name`; either side is absent when never set
    pub fn metric_bounds(&self, name: &str) -> (Option<f64>, Option<f64>) {
        (
            self.get_f64(&format!("{}{}", meta::METRIC_MIN_PREFIX, name)),
            self.get_f64(&format!("{}{}", meta::METRIC_MAX_PREFIX, name)),
        )
    }

    /// All numeric `metric.*` entries, keyed by metric name
    pub fn metrics(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().filter_map(|(k, v)| {
            let name = k.strip_prefix(meta::METRIC_PREFIX)?;
            v.as_f64().map(|value| (name, value))
        })
    }
}

/// Image, keypoints and metadata for exactly one pipeline pass. A fresh
/// instance is built for every pass; nothing in it survives to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameData {
    pub image: Option<RgbaImage>,
    pub keypoints: Option<Arc<KeypointSet>>,
    pub metadata: Metadata,
}

impl FrameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: RgbaImage) -> Self {
        Self {
            image: Some(image),
            ..Self::default()
        }
    }

    pub fn width(&self) -> u32 {
        self.image.as_ref().map(|img| img.width()).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.image.as_ref().map(|img| img.height()).unwrap_or(0)
    }

    /// Replace the keypoint collection seen by downstream transformers
    pub fn set_keypoints(&mut self, keypoints: KeypointSet) {
        self.keypoints = Some(Arc::new(keypoints));
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.metadata.get_u64(meta::FRAME_INDEX)
    }

    pub fn signal(&self) -> Option<f32> {
        self.metadata.get_f64(meta::SIGNAL).map(|v| v as f32)
    }

    pub fn set_signal(&mut self, value: f32) {
        self.metadata.insert(meta::SIGNAL, f64::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SkeletonTopology;

    #[test]
    fn test_metrics_iterates_only_numeric_metric_entries() {
        let mut metadata = Metadata::new();
        metadata.set_metric("shoulder_height", 0.5);
        metadata.set_metric("left_hand_x", 0.25);
        metadata.insert("metric.label", "not a number");
        metadata.insert(meta::FRAME_INDEX, 3u64);

        let mut metrics: Vec<_> = metadata.metrics().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        assert_eq!(metrics, vec![("left_hand_x", 0.25), ("shoulder_height", 0.5)]);
        assert_eq!(metadata.metric("shoulder_height"), Some(0.5));
    }

    #[test]
    fn test_metric_bounds_are_not_metrics() {
        let mut metadata = Metadata::new();
        metadata.set_metric("shoulder_height", 0.5);
        metadata.set_metric_bounds("shoulder_height", 0.2, 0.8);

        assert_eq!(metadata.metrics().count(), 1);
        assert_eq!(metadata.metric_bounds("shoulder_height"), (Some(0.2), Some(0.8)));
        assert_eq!(metadata.metric_bounds("left_hand_x"), (None, None));
    }

    #[test]
    fn test_frame_defaults() {
        let frame = FrameData::new();
        assert!(frame.image.is_none());
        assert!(frame.keypoints.is_none());
        assert_eq!(frame.width(), 0);
        assert_eq!(frame.signal(), None);
    }

    #[test]
    fn test_signal_round_trip_through_metadata() {
        let mut frame = FrameData::with_image(RgbaImage::new(4, 2));
        frame.set_signal(0.25);
        assert_eq!(frame.signal(), Some(0.25));
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
    }

    #[test]
    fn test_set_keypoints_shares_immutable_set() {
        let mut frame = FrameData::new();
        frame.set_keypoints(KeypointSet::empty(SkeletonTopology::move_net()));
        let seen_by_a = frame.keypoints.clone().unwrap();
        let seen_by_b = frame.keypoints.clone().unwrap();
        assert!(Arc::ptr_eq(&seen_by_a, &seen_by_b));
    }
}
