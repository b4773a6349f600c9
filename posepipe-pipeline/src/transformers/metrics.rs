//! Body metrics derived from keypoints, and their smoothing

use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use posepipe_core::{Error, FrameData, KeypointSet, Landmark, Result};
use std::collections::{HashMap, VecDeque};

pub const METRIC_EXTRACTOR: &str = "metric_extractor";
pub const SLIDING_AVERAGE: &str = "sliding_average";
pub const DERIVATIVE: &str = "derivative";

/// Suffixes of the metrics written by [`Derivative`]
pub const FIRST_DIFFERENCE_SUFFIX: &str = "_d1";
pub const SECOND_DIFFERENCE_SUFFIX: &str = "_d2";

pub const NOSE_DISTANCE: &str = "nose_distance";
pub const SHOULDER_DISTANCE: &str = "shoulder_distance";
pub const SHOULDER_ELEVATION_ANGLE: &str = "shoulder_elevation_angle";
pub const SHOULDER_HEIGHT: &str = "shoulder_height";
pub const LEFT_ELBOW_HEIGHT: &str = "left_elbow_height";
pub const RIGHT_ELBOW_HEIGHT: &str = "right_elbow_height";
pub const LEFT_HAND_ELEVATION: &str = "left_hand_elevation";
pub const RIGHT_HAND_ELEVATION: &str = "right_hand_elevation";
pub const LEFT_HAND_X: &str = "left_hand_x";
pub const RIGHT_HAND_X: &str = "right_hand_x";

/// Every metric the extractor can produce
pub const ALL_METRICS: [&str; 10] = [
    NOSE_DISTANCE,
    SHOULDER_DISTANCE,
    SHOULDER_ELEVATION_ANGLE,
    SHOULDER_HEIGHT,
    LEFT_ELBOW_HEIGHT,
    RIGHT_ELBOW_HEIGHT,
    LEFT_HAND_ELEVATION,
    RIGHT_HAND_ELEVATION,
    LEFT_HAND_X,
    RIGHT_HAND_X,
];

/// Computes the metrics available for `keypoints`. Metrics whose landmarks
/// the topology lacks are left out.
pub fn compute_metrics(keypoints: &KeypointSet) -> Vec<(&'static str, f64)> {
    let lm = |l: Landmark| keypoints.landmark(l);
    let mut out = Vec::with_capacity(ALL_METRICS.len());

    if let Some(nose) = lm(Landmark::Nose) {
        out.push((NOSE_DISTANCE, f64::from(nose.z)));
    }

    if let (Some(left), Some(right)) = (lm(Landmark::LeftShoulder), lm(Landmark::RightShoulder)) {
        let dx = f64::from(left.x - right.x);
        let dy = f64::from(left.y - right.y);
        out.push((SHOULDER_DISTANCE, (dx * dx + dy * dy).sqrt()));
        let angle = if dx == 0.0 {
            0.0
        } else {
            (dy.abs() / dx.abs()).atan().to_degrees()
        };
        out.push((SHOULDER_ELEVATION_ANGLE, angle));
        out.push((SHOULDER_HEIGHT, 1.0 - f64::from(left.y + right.y) / 2.0));
    }

    let heights = [
        (Landmark::LeftElbow, LEFT_ELBOW_HEIGHT),
        (Landmark::RightElbow, RIGHT_ELBOW_HEIGHT),
        (Landmark::LeftWrist, LEFT_HAND_ELEVATION),
        (Landmark::RightWrist, RIGHT_HAND_ELEVATION),
    ];
    for (landmark, name) in heights {
        if let Some(k) = lm(landmark) {
            out.push((name, 1.0 - f64::from(k.y)));
        }
    }

    if let Some(k) = lm(Landmark::LeftWrist) {
        out.push((LEFT_HAND_X, f64::from(k.x)));
    }
    if let Some(k) = lm(Landmark::RightWrist) {
        out.push((RIGHT_HAND_X, f64::from(k.x)));
    }
    out
}

pub struct MetricExtractor {
    base: TransformerBase,
}

impl MetricExtractor {
    pub fn new() -> Self {
        Self {
            base: TransformerBase::new(METRIC_EXTRACTOR, "Metric Extractor"),
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: METRIC_EXTRACTOR,
            description: "Derives body metrics (heights, distances, angles) from keypoints",
            role: Role::Interior,
            parameters: Vec::new(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new()))
    }
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for MetricExtractor {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        if let Some(keypoints) = frame.keypoints.clone() {
            for (name, value) in compute_metrics(&keypoints) {
                frame.metadata.set_metric(name, value);
            }
        }
        Ok(Flow::Continue(frame))
    }
}

/// Moving average over the last `window` values of each metric.
///
/// The history belongs to the transformer, not the frame, and is dropped on
/// close so a new run starts unsmoothed.
pub struct SlidingAverage {
    base: TransformerBase,
    window: usize,
    history: HashMap<String, VecDeque<f64>>,
}

impl SlidingAverage {
    pub fn new(window: usize) -> Self {
        Self {
            base: TransformerBase::new(SLIDING_AVERAGE, "Sliding Average"),
            window: window.max(1),
            history: HashMap::new(),
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: SLIDING_AVERAGE,
            description: "Smooths every metric with a moving average",
            role: Role::Interior,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(10)))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![ParamSpec::int("window", "Number of values averaged").range(1.0, 1000.0)]
    }

    fn trim(&mut self) {
        for values in self.history.values_mut() {
            while values.len() > self.window {
                values.pop_front();
            }
        }
    }
}

impl Transformer for SlidingAverage {
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
        (name == "window").then(|| ParamValue::Int(self.window as i64))
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("window", ParamValue::Int(v)) => {
                self.window = v.max(1) as usize;
                self.trim();
                Ok(())
            }
            (name, value) => Err(Error::config(format!(
                "Cannot set '{}' to {} on '{}'",
                name,
                value,
                self.name()
            ))),
        }
    }

    fn close(&mut self) {
        self.history.clear();
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        let metrics: Vec<(String, f64)> = frame
            .metadata
            .metrics()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        for (name, value) in metrics {
            let values = self.history.entry(name.clone()).or_default();
            values.push_back(value);
            while values.len() > self.window {
                values.pop_front();
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            frame.metadata.set_metric(&name, mean);
        }
        Ok(Flow::Continue(frame))
    }
}

#[derive(Debug, Clone, Copy)]
struct LastSeen {
    value: f64,
    first: Option<f64>,
}

/// Per-pass first and second differences of every metric, written back as
/// `<name>_d1` and `<name>_d2` so a selector can follow velocity or
/// acceleration. A metric seen for the first time has no motion yet: both
/// differences start at zero.
pub struct Derivative {
    base: TransformerBase,
    last: HashMap<String, LastSeen>,
}

impl Derivative {
    pub fn new() -> Self {
        Self {
            base: TransformerBase::new(DERIVATIVE, "Derivative"),
            last: HashMap::new(),
        }
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: DERIVATIVE,
            description: "Adds the first and second per-pass difference of every metric",
            role: Role::Interior,
            parameters: Vec::new(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new()))
    }

    fn differences(&mut self, name: &str, value: f64) -> (f64, f64) {
        let previous = self.last.get(name).copied();
        let first = previous.map(|p| value - p.value);
        let second = match (first, previous.and_then(|p| p.first)) {
            (Some(now), Some(before)) => now - before,
            _ => 0.0,
        };
        self.last.insert(name.to_string(), LastSeen { value, first });
        (first.unwrap_or(0.0), second)
    }
}

impl Default for Derivative {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for Derivative {
    fn base(&self) -> &TransformerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TransformerBase {
        &mut self.base
    }

    fn close(&mut self) {
        self.last.clear();
    }

    fn transform(&mut self, mut frame: FrameData, _ctx: &PassContext) -> Result<Flow> {
        let metrics: Vec<(String, f64)> = frame
            .metadata
            .metrics()
            .filter(|(name, _)| {
                !name.ends_with(FIRST_DIFFERENCE_SUFFIX) && !name.ends_with(SECOND_DIFFERENCE_SUFFIX)
            })
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        for (name, value) in metrics {
            let (first, second) = self.differences(&name, value);
            frame
                .metadata
                .set_metric(&format!("{}{}", name, FIRST_DIFFERENCE_SUFFIX), first);
            frame
                .metadata
                .set_metric(&format!("{}{}", name, SECOND_DIFFERENCE_SUFFIX), second);
        }
        Ok(Flow::Continue(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posepipe_core::{Keypoint, SkeletonTopology};

    fn keypoints(points: &[(Landmark, Keypoint)]) -> KeypointSet {
        let topology = SkeletonTopology::move_net();
        let mut all = vec![Keypoint::default(); topology.size()];
        for &(landmark, keypoint) in points {
            all[topology.index_of(landmark).unwrap()] = keypoint;
        }
        KeypointSet::new(all, topology).unwrap()
    }

    fn metric(metrics: &[(&str, f64)], name: &str) -> f64 {
        metrics.iter().find(|(n, _)| *n == name).unwrap().1
    }

    #[test]
    fn test_shoulder_metrics() {
        let set = keypoints(&[
            (Landmark::LeftShoulder, Keypoint::new(0.4, 0.7, 0.0, 1.0)),
            (Landmark::RightShoulder, Keypoint::new(0.2, 0.3, 0.0, 1.0)),
        ]);
        let metrics = compute_metrics(&set);
        assert!((metric(&metrics, SHOULDER_HEIGHT) - 0.7).abs() < 1e-6);
        assert!((metric(&metrics, SHOULDER_DISTANCE) - 0.2f64.hypot(0.4)).abs() < 1e-6);
        let expected = (0.2f64 / 0.4).atan().to_degrees();
        assert!((metric(&metrics, SHOULDER_ELEVATION_ANGLE) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_vertical_shoulders_have_zero_angle() {
        let set = keypoints(&[
            (Landmark::LeftShoulder, Keypoint::new(0.2, 0.5, 0.0, 1.0)),
            (Landmark::RightShoulder, Keypoint::new(0.6, 0.5, 0.0, 1.0)),
        ]);
        assert_eq!(metric(&compute_metrics(&set), SHOULDER_ELEVATION_ANGLE), 0.0);
    }

    #[test]
    fn test_extractor_writes_all_metrics() {
        let mut frame = FrameData::new();
        frame.set_keypoints(keypoints(&[(
            Landmark::RightWrist,
            Keypoint::new(0.25, 0.6, 0.0, 1.0),
        )]));
        let out = MetricExtractor::new()
            .transform(frame, &PassContext::default())
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(out.metadata.metrics().count(), ALL_METRICS.len());
        assert!((out.metadata.metric(RIGHT_HAND_ELEVATION).unwrap() - 0.75).abs() < 1e-6);
        assert!((out.metadata.metric(RIGHT_HAND_X).unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_extractor_without_keypoints_adds_nothing() {
        let out = MetricExtractor::new()
            .transform(FrameData::new(), &PassContext::default())
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(out.metadata.metrics().count(), 0);
    }

    fn smooth(average: &mut SlidingAverage, value: f64) -> f64 {
        let mut frame = FrameData::new();
        frame.metadata.set_metric(SHOULDER_HEIGHT, value);
        average
            .transform(frame, &PassContext::default())
            .unwrap()
            .into_frame()
            .unwrap()
            .metadata
            .metric(SHOULDER_HEIGHT)
            .unwrap()
    }

    #[test]
    fn test_sliding_average_over_window() {
        let mut average = SlidingAverage::new(2);
        assert_eq!(smooth(&mut average, 1.0), 1.0);
        assert_eq!(smooth(&mut average, 3.0), 2.0);
        assert_eq!(smooth(&mut average, 5.0), 4.0);
    }

    #[test]
    fn test_shrinking_window_trims_history() {
        let mut average = SlidingAverage::new(3);
        smooth(&mut average, 1.0);
        smooth(&mut average, 2.0);
        average.set_parameter("window", ParamValue::Int(1)).unwrap();
        assert_eq!(smooth(&mut average, 9.0), 9.0);
    }

    #[test]
    fn test_close_resets_history() {
        let mut average = SlidingAverage::new(4);
        smooth(&mut average, 10.0);
        average.close();
        assert_eq!(smooth(&mut average, 2.0), 2.0);
    }

    #[test]
    fn test_window_out_of_range_is_rejected() {
        let mut average = SlidingAverage::new(4);
        assert!(average.set_parameter("window", ParamValue::Int(0)).is_err());
        assert_eq!(average.get_parameter("window"), Some(ParamValue::Int(4)));
    }

    fn differentiate(derivative: &mut Derivative, value: f64) -> (f64, f64) {
        let mut frame = FrameData::new();
        frame.metadata.set_metric(SHOULDER_HEIGHT, value);
        let out = derivative
            .transform(frame, &PassContext::default())
            .unwrap()
            .into_frame()
            .unwrap();
        (
            out.metadata.metric("shoulder_height_d1").unwrap(),
            out.metadata.metric("shoulder_height_d2").unwrap(),
        )
    }

    #[test]
    fn test_derivative_differences() {
        let mut derivative = Derivative::new();
        assert_eq!(differentiate(&mut derivative, 1.0), (0.0, 0.0));
        assert_eq!(differentiate(&mut derivative, 3.0), (2.0, 0.0));
        assert_eq!(differentiate(&mut derivative, 7.0), (4.0, 2.0));
        assert_eq!(differentiate(&mut derivative, 8.0), (1.0, -3.0));
    }

    #[test]
    fn test_derivative_ignores_its_own_output() {
        let mut derivative = Derivative::new();
        let mut frame = FrameData::new();
        frame.metadata.set_metric(LEFT_HAND_X, 0.5);
        frame.metadata.set_metric("left_hand_x_d1", 9.0);
        let out = derivative
            .transform(frame, &PassContext::default())
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(out.metadata.metrics().count(), 3);
        assert_eq!(out.metadata.metric("left_hand_x_d1"), Some(0.0));
        assert!(out.metadata.metric("left_hand_x_d1_d1").is_none());
    }

    #[test]
    fn test_derivative_close_forgets_history() {
        let mut derivative = Derivative::new();
        differentiate(&mut derivative, 1.0);
        differentiate(&mut derivative, 5.0);
        derivative.close();
        assert_eq!(differentiate(&mut derivative, 2.0), (0.0, 0.0));
    }
}
