//! Normalizes one scalar of the frame into the published signal

use crate::param::{ParamSpec, ParamValue};
use crate::registry::{BuildContext, KindInfo};
use crate::transformer::{Flow, PassContext, Role, Transformer, TransformerBase};
use crate::transformers::metrics::SHOULDER_HEIGHT;
use posepipe_core::{Error, FrameData, Landmark, Result};
use std::str::FromStr;
use tracing::debug;

pub const KIND: &str = "min_max_selector";

/// Where the selector reads its input value from
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A `metric.*` metadata entry
    Metric(String),
    /// One component of a landmark, written `nose.confidence`
    Landmark { landmark: Landmark, component: String },
}

impl FromStr for Input {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::config("Selector input cannot be empty"));
        }
        match s.split_once('.') {
            Some((landmark, component)) => {
                let landmark = Landmark::from_str(landmark)?;
                if !matches!(component, "x" | "y" | "z" | "confidence") {
                    return Err(Error::config(format!(
                        "Unknown keypoint component '{}' (expected x, y, z or confidence)",
                        component
                    )));
                }
                Ok(Input::Landmark {
                    landmark,
                    component: component.to_string(),
                })
            }
            None => Ok(Input::Metric(s.to_string())),
        }
    }
}

impl std::fmt::Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::Metric(name) => f.write_str(name),
            Input::Landmark { landmark, component } => write!(f, "{}.{}", landmark, component),
        }
    }
}

impl Input {
    fn read(&self, frame: &FrameData) -> Option<f64> {
        match self {
            Input::Metric(name) => frame.metadata.metric(name),
            Input::Landmark {
                landmark,
                component,
            } => frame
                .keypoints
                .as_ref()?
                .landmark(*landmark)?
                .component(component)
                .map(f64::from),
        }
    }
}

/// `signal = clamp((v - min) / (max - min), 0, 1)`
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Maps a selected metric or keypoint component onto `[0, 1]`. `min` stays
/// strictly below `max`; a pass without the input leaves the frame unchanged.
pub struct MinMaxSelector {
    base: TransformerBase,
    input: Input,
    min: f64,
    max: f64,
}

impl MinMaxSelector {
    pub fn new(input: Input, min: f64, max: f64) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(Error::config(format!(
                "Selector range is empty: min {} must be below max {}",
                min, max
            )));
        }
        Ok(Self {
            base: TransformerBase::new(KIND, "Min/Max Selector"),
            input,
            min,
            max,
        })
    }

    pub fn info() -> KindInfo {
        KindInfo {
            kind: KIND,
            description: "Normalizes a metric or keypoint component into the signal",
            role: Role::Interior,
            parameters: Self::param_specs(),
        }
    }

    pub fn create(_ctx: &BuildContext) -> Result<Box<dyn Transformer>> {
        Ok(Box::new(Self::new(
            Input::Metric(SHOULDER_HEIGHT.to_string()),
            0.0,
            1.0,
        )?))
    }

    fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::text("input", "Metric name or landmark.component"),
            ParamSpec::float("min", "Input value mapped to 0"),
            ParamSpec::float("max", "Input value mapped to 1"),
        ]
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    fn check_range(&self, min: f64, max: f64) -> Result<()> {
        if min < max {
            Ok(())
        } else {
            Err(Error::config(format!(
                "'{}' needs min below max, got min {} and max {}",
                self.name(),
                min,
                max
            )))
        }
    }
}

impl Transformer for MinMaxSelector {
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
            "input" => Some(self.input.to_string().into()),
            "min" => Some(self.min.into()),
            "max" => Some(self.max.into()),
            _ => None,
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, value) {
            ("input", ParamValue::Text(text)) => self.input = text.parse()?,
            ("min", ParamValue::Float(min)) => {
                self.check_range(min, self.max)?;
                self.min = min;
            }
            ("max", ParamValue::Float(max)) => {
                self.check_range(self.min, max)?;
                self.max = max;
            }
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
        let Some(value) = self.input.read(&frame) else {
            debug!("'{}': no {} in this frame", self.name(), self.input);
            return Ok(Flow::Continue(frame));
        };
        frame.set_signal(normalize(value, self.min, self.max) as f32);
        if let Input::Metric(name) = &self.input {
            frame.metadata.set_metric_bounds(name, self.min, self.max);
        }
        Ok(Flow::Continue(frame))
    }
}
