//! Transformer identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique transformer identifier, stable for the lifetime of the instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransformerId(pub String);

impl TransformerId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        use uuid::Uuid;
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for TransformerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TransformerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TransformerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
