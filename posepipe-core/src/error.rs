//! Error taxonomy shared by every posepipe crate

use crate::id::TransformerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The transformer a runtime failure is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub id: Option<TransformerId>,
    pub name: String,
}

impl Origin {
    pub fn new(id: TransformerId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }

    /// Placeholder until the enclosing pipeline attributes the failure
    pub fn unattributed() -> Self {
        Self {
            id: None,
            name: String::new(),
        }
    }

    pub fn is_attributed(&self) -> bool {
        self.id.is_some()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "'{}' ({})", self.name, id.short()),
            None => write!(f, "<unattributed>"),
        }
    }
}

/// Coarse classification used by status consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    Resource,
    Transform,
    Protocol,
    State,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resource error in {origin}: {cause}")]
    Resource { origin: Origin, cause: String },

    #[error("Transform error in {origin}: {cause}")]
    Transform { origin: Origin, cause: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn resource(cause: impl fmt::Display) -> Self {
        Error::Resource {
            origin: Origin::unattributed(),
            cause: cause.to_string(),
        }
    }

    pub fn transform(cause: impl fmt::Display) -> Self {
        Error::Transform {
            origin: Origin::unattributed(),
            cause: cause.to_string(),
        }
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Resource { .. } | Error::Io(_) => ErrorKind::Resource,
            Error::Transform { .. } => ErrorKind::Transform,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::State(_) => ErrorKind::State,
        }
    }

    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Error::Resource { origin, .. } | Error::Transform { origin, .. } => {
                Some(origin).filter(|o| o.is_attributed())
            }
            _ => None,
        }
    }

    /// Name the member a configuration or state problem belongs to. Runtime
    /// failures carry an [`Origin`] instead and pass through unchanged.
    pub fn in_member(self, name: &str) -> Self {
        match self {
            Error::Configuration(msg) => Error::Configuration(format!("'{}': {}", name, msg)),
            Error::State(msg) => Error::State(format!("'{}': {}", name, msg)),
            other => other,
        }
    }

    /// Attribute a runtime failure to `id`/`name` unless a deeper member
    /// already claimed it. IO failures raised inside a transformer become
    /// resource errors so they carry an origin as well.
    pub fn attribute(self, id: &TransformerId, name: &str) -> Self {
        match self {
            Error::Resource { origin, cause } if !origin.is_attributed() => Error::Resource {
                origin: Origin::new(id.clone(), name),
                cause,
            },
            Error::Transform { origin, cause } if !origin.is_attributed() => Error::Transform {
                origin: Origin::new(id.clone(), name),
                cause,
            },
            Error::Io(err) => Error::Resource {
                origin: Origin::new(id.clone(), name),
                cause: err.to_string(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("window must be positive");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("window must be positive"));
    }

    #[test]
    fn test_unattributed_has_no_origin() {
        let err = Error::resource("camera unplugged");
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(err.origin().is_none());
        assert!(err.to_string().contains("<unattributed>"));
    }

    #[test]
    fn test_attribute_sets_origin_once() {
        let inner = TransformerId::from("inner");
        let outer = TransformerId::from("outer");

        let err = Error::transform("bad frame")
            .attribute(&inner, "Mirror")
            .attribute(&outer, "Pipeline");

        let origin = err.origin().expect("attributed");
        assert_eq!(origin.id.as_ref(), Some(&inner));
        assert_eq!(origin.name, "Mirror");
        assert_eq!(err.kind(), ErrorKind::Transform);
    }

    #[test]
    fn test_io_error_becomes_resource_when_attributed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: Error = io_err.into();
        let err = err.attribute(&TransformerId::from("rec"), "Keypoint Recorder");
        match err {
            Error::Resource { origin, cause } => {
                assert_eq!(origin.name, "Keypoint Recorder");
                assert!(cause.contains("no such file"));
            }
            other => panic!("Expected Resource error, got {:?}", other),
        }
    }

    #[test]
    fn test_in_member_names_configuration_errors() {
        let err = Error::config("Directory source needs a path").in_member("Video Source");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("'Video Source': Directory source needs a path"));

        let err = Error::resource("busy").in_member("Video Source");
        assert!(!err.to_string().contains("'Video Source':"));
    }

    #[test]
    fn test_configuration_is_never_attributed() {
        let err = Error::config("cycle").attribute(&TransformerId::from("p"), "Pipeline");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.origin().is_none());
    }
}
