//! Typed transformer parameters

use posepipe_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Text,
    Color,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Text => "text",
            ParamKind::Color => "color",
        };
        f.write_str(name)
    }
}

/// A parameter value as set by the UI or read from a pipeline description.
/// Untagged so TOML/JSON literals map naturally (`10`, `0.5`, `"path"`,
/// `[255, 0, 0, 255]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Color([u8; 4]),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Text(_) => ParamKind::Text,
            ParamValue::Color(_) => ParamKind::Color,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<[u8; 4]> {
        match self {
            ParamValue::Color(c) => Some(*c),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => write!(f, "\"{}\"", s),
            ParamValue::Color([r, g, b, a]) => write!(f, "rgba({}, {}, {}, {})", r, g, b, a),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(f64::from(v))
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<[u8; 4]> for ParamValue {
    fn from(v: [u8; 4]) -> Self {
        ParamValue::Color(v)
    }
}

/// Describes one parameter so a UI can render and validate it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<&'static [&'static str]>,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            min: None,
            max: None,
            choices: None,
        }
    }

    pub fn bool(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Bool, description)
    }

    pub fn int(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Int, description)
    }

    pub fn float(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Float, description)
    }

    pub fn text(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Text, description)
    }

    pub fn color(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Color, description)
    }

    /// Inclusive numeric range
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Check `value` against this spec, returning it normalized to the
    /// declared kind (ints are accepted for float parameters).
    pub fn validate(&self, value: ParamValue) -> Result<ParamValue> {
        let value = match (self.kind, value) {
            (ParamKind::Float, ParamValue::Int(i)) => ParamValue::Float(i as f64),
            (kind, value) if kind == value.kind() => value,
            (kind, value) => {
                return Err(Error::config(format!(
                    "Parameter '{}' expects {}, got {} {}",
                    self.name,
                    kind,
                    value.kind(),
                    value
                )))
            }
        };

        match &value {
            ParamValue::Float(f) if !f.is_finite() => {
                return Err(Error::config(format!(
                    "Parameter '{}' must be finite, got {}",
                    self.name, f
                )));
            }
            ParamValue::Int(_) | ParamValue::Float(_) => {
                let number = value.as_float().unwrap_or_default();
                if let Some(min) = self.min.filter(|min| number < *min) {
                    return Err(Error::config(format!(
                        "Parameter '{}' must be at least {}, got {}",
                        self.name, min, value
                    )));
                }
                if let Some(max) = self.max.filter(|max| number > *max) {
                    return Err(Error::config(format!(
                        "Parameter '{}' must be at most {}, got {}",
                        self.name, max, value
                    )));
                }
            }
            ParamValue::Text(s) => {
                if let Some(choices) = self.choices.filter(|c| !c.contains(&s.as_str())) {
                    return Err(Error::config(format!(
                        "Parameter '{}' must be one of {:?}, got \"{}\"",
                        self.name, choices, s
                    )));
                }
            }
            _ => {}
        }

        Ok(value)
    }
}

/// Find the spec for `name` among `specs`
pub fn lookup<'a>(specs: &'a [ParamSpec], name: &str, owner: &str) -> Result<&'a ParamSpec> {
    specs
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| Error::config(format!("'{}' has no parameter '{}'", owner, name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_matching_kind() {
        let spec = ParamSpec::int("window", "frames").range(1.0, 100.0);
        assert_eq!(spec.validate(ParamValue::Int(10)).unwrap(), ParamValue::Int(10));
    }

    #[test]
    fn test_validate_widens_int_to_float() {
        let spec = ParamSpec::float("min", "lower bound");
        assert_eq!(spec.validate(ParamValue::Int(1)).unwrap(), ParamValue::Float(1.0));
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let spec = ParamSpec::int("window", "frames");
        let err = spec.validate(ParamValue::Text("ten".into())).unwrap_err();
        assert!(err.to_string().contains("expects int"));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let spec = ParamSpec::int("window", "frames").range(1.0, 100.0);
        assert!(spec.validate(ParamValue::Int(0)).is_err());
        assert!(spec.validate(ParamValue::Int(101)).is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let spec = ParamSpec::float("min", "lower bound");
        assert!(spec.validate(ParamValue::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_validate_checks_choices() {
        let spec = ParamSpec::text("source", "kind").choices(&["synthetic", "directory"]);
        assert!(spec.validate("directory".into()).is_ok());
        assert!(spec.validate("camera".into()).is_err());
    }

    #[test]
    fn test_untagged_deserialization() {
        let values: Vec<ParamValue> =
            serde_json::from_str(r#"[true, 3, 0.5, "x", [1, 2, 3, 4]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Bool(true),
                ParamValue::Int(3),
                ParamValue::Float(0.5),
                ParamValue::Text("x".into()),
                ParamValue::Color([1, 2, 3, 4]),
            ]
        );
    }
}
