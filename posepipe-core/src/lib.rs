//! posepipe-core: shared data model for the pose-tracking pipeline
//!
//! Provides:
//! - Keypoints, keypoint sets and skeleton topologies
//! - The per-pass `FrameData` envelope
//! - Injected process-wide configuration (`GlobalProps`)
//! - The error taxonomy used across the workspace

pub mod error;
pub mod frame;
pub mod id;
pub mod keypoint;
pub mod props;
pub mod topology;

pub use error::{Error, ErrorKind, Origin, Result};
pub use frame::{meta, FrameData, Metadata};
pub use id::TransformerId;
pub use keypoint::{Keypoint, KeypointRecord, KeypointSet};
pub use props::GlobalProps;
pub use topology::{Landmark, SkeletonTopology};

pub use image::{Rgba, RgbaImage};
