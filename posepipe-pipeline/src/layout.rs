//! Serializable pipeline descriptions: what to build, and what was built

use crate::param::ParamValue;
use crate::pipeline;
use crate::transformer::{Role, Transformer};
use posepipe_core::TransformerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn enabled_by_default() -> bool {
    true
}

/// One stage of a pipeline description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Registered transformer kind
    pub kind: String,
    /// Display name; the kind's default name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
    /// Nested stages, only meaningful for the `pipeline` kind
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<StageSpec>,
}

impl StageSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            enabled: true,
            params: BTreeMap::new(),
            members: Vec::new(),
        }
    }

    /// A nested pipeline holding `members`
    pub fn nested(members: Vec<StageSpec>) -> Self {
        Self {
            members,
            ..Self::new(pipeline::KIND)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Description of a whole pipeline, as loaded from a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSpec {
    pub name: Option<String>,
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    pub fn new(stages: Vec<StageSpec>) -> Self {
        Self { name: None, stages }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Read-only view of a built transformer tree, handed to UIs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformerSnapshot {
    pub id: TransformerId,
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub role: Role,
    pub parameters: BTreeMap<String, ParamValue>,
    pub members: Vec<TransformerSnapshot>,
}

pub type PipelineSnapshot = TransformerSnapshot;

impl TransformerSnapshot {
    pub fn capture(transformer: &dyn Transformer) -> Self {
        let parameters = transformer
            .parameters()
            .iter()
            .filter_map(|spec| {
                transformer
                    .get_parameter(spec.name)
                    .map(|value| (spec.name.to_string(), value))
            })
            .collect();
        let members = transformer
            .as_pipeline()
            .map(|p| p.members().iter().map(|m| Self::capture(m.as_ref())).collect())
            .unwrap_or_default();

        Self {
            id: transformer.id().clone(),
            name: transformer.name().to_string(),
            kind: transformer.kind().to_string(),
            enabled: transformer.is_enabled(),
            role: transformer.role(),
            parameters,
            members,
        }
    }

    /// Number of transformers in this tree, itself included
    pub fn count(&self) -> usize {
        1 + self.members.iter().map(Self::count).sum::<usize>()
    }

    /// Stage description that rebuilds this tree (with fresh ids)
    pub fn to_stage(&self) -> StageSpec {
        StageSpec {
            kind: self.kind.clone(),
            name: Some(self.name.clone()),
            enabled: self.enabled,
            params: self.parameters.clone(),
            members: self.members.iter().map(Self::to_stage).collect(),
        }
    }

    /// Pipeline description of a root snapshot
    pub fn to_spec(&self) -> PipelineSpec {
        PipelineSpec {
            name: Some(self.name.clone()),
            stages: self.members.iter().map(Self::to_stage).collect(),
        }
    }
}
