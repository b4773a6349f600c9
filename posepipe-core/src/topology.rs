//! Skeleton topologies and the commonly used landmark names

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Landmarks every pose model is expected to expose under a common name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Landmark {
    pub const ALL: [Landmark; 13] = [
        Landmark::Nose,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftKnee,
        Landmark::RightKnee,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Landmark::Nose => "nose",
            Landmark::LeftShoulder => "left_shoulder",
            Landmark::RightShoulder => "right_shoulder",
            Landmark::LeftElbow => "left_elbow",
            Landmark::RightElbow => "right_elbow",
            Landmark::LeftWrist => "left_wrist",
            Landmark::RightWrist => "right_wrist",
            Landmark::LeftHip => "left_hip",
            Landmark::RightHip => "right_hip",
            Landmark::LeftKnee => "left_knee",
            Landmark::RightKnee => "right_knee",
            Landmark::LeftAnkle => "left_ankle",
            Landmark::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Landmark {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Landmark::ALL
            .iter()
            .copied()
            .find(|l| l.name() == s)
            .ok_or_else(|| Error::config(format!("Unknown landmark '{}'", s)))
    }
}

/// Which landmarks connect visually, plus the model's landmark index scheme
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonTopology {
    name: String,
    size: usize,
    edges: Vec<(usize, usize)>,
    landmarks: BTreeMap<Landmark, usize>,
}

impl SkeletonTopology {
    /// Create a topology, rejecting edges or landmarks outside `0..size`
    pub fn new(
        name: impl Into<String>,
        size: usize,
        edges: Vec<(usize, usize)>,
        landmarks: BTreeMap<Landmark, usize>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::config("Topology name cannot be empty"));
        }
        if size == 0 {
            return Err(Error::config(format!("Topology '{}' has no keypoints", name)));
        }
        if let Some((a, b)) = edges.iter().find(|(a, b)| *a >= size || *b >= size) {
            return Err(Error::config(format!(
                "Topology '{}' edge ({}, {}) out of range for {} keypoints",
                name, a, b, size
            )));
        }
        if let Some((landmark, idx)) = landmarks.iter().find(|(_, idx)| **idx >= size) {
            return Err(Error::config(format!(
                "Topology '{}' maps {} to index {} out of range",
                name, landmark, idx
            )));
        }

        Ok(Self {
            name,
            size,
            edges,
            landmarks,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn index_of(&self, landmark: Landmark) -> Option<usize> {
        self.landmarks.get(&landmark).copied()
    }

    /// Built-in topology lookup used when decoding recorded keypoints
    pub fn by_name(name: &str) -> Option<Arc<SkeletonTopology>> {
        match name {
            BLAZE_POSE => Some(Self::blaze_pose()),
            MOVE_NET => Some(Self::move_net()),
            _ => None,
        }
    }

    /// MediaPipe BlazePose, 33 landmarks
    pub fn blaze_pose() -> Arc<SkeletonTopology> {
        static TOPOLOGY: OnceLock<Arc<SkeletonTopology>> = OnceLock::new();
        TOPOLOGY
            .get_or_init(|| {
                let polylines: [&[usize]; 6] = [
                    &[21, 15, 17, 19, 15, 13, 11, 23, 25, 27, 31, 29, 27],
                    &[22, 16, 18, 20, 16, 14, 12, 24, 26, 28, 32, 30],
                    &[11, 12],
                    &[23, 24],
                    &[8, 6, 5, 4, 0, 1, 2, 3, 7],
                    &[9, 10],
                ];
                let edges = polylines
                    .iter()
                    .flat_map(|line| line.windows(2).map(|w| (w[0], w[1])))
                    .collect();
                let landmarks = BTreeMap::from([
                    (Landmark::Nose, 0),
                    (Landmark::LeftShoulder, 11),
                    (Landmark::RightShoulder, 12),
                    (Landmark::LeftElbow, 13),
                    (Landmark::RightElbow, 14),
                    (Landmark::LeftWrist, 15),
                    (Landmark::RightWrist, 16),
                    (Landmark::LeftHip, 23),
                    (Landmark::RightHip, 24),
                    (Landmark::LeftKnee, 25),
                    (Landmark::RightKnee, 26),
                    (Landmark::LeftAnkle, 27),
                    (Landmark::RightAnkle, 28),
                ]);
                Arc::new(Self {
                    name: BLAZE_POSE.to_string(),
                    size: 33,
                    edges,
                    landmarks,
                })
            })
            .clone()
    }

    /// MoveNet, 17 landmarks in COCO order
    pub fn move_net() -> Arc<SkeletonTopology> {
        static TOPOLOGY: OnceLock<Arc<SkeletonTopology>> = OnceLock::new();
        TOPOLOGY
            .get_or_init(|| {
                let edges = vec![
                    // face
                    (3, 1),
                    (1, 0),
                    (0, 2),
                    (2, 4),
                    // upper body
                    (5, 6),
                    (5, 7),
                    (7, 9),
                    (6, 8),
                    (8, 10),
                    // torso
                    (5, 11),
                    (6, 12),
                    (11, 12),
                    // lower body
                    (11, 13),
                    (13, 15),
                    (12, 14),
                    (14, 16),
                ];
                let landmarks = BTreeMap::from([
                    (Landmark::Nose, 0),
                    (Landmark::LeftShoulder, 5),
                    (Landmark::RightShoulder, 6),
                    (Landmark::LeftElbow, 7),
                    (Landmark::RightElbow, 8),
                    (Landmark::LeftWrist, 9),
                    (Landmark::RightWrist, 10),
                    (Landmark::LeftHip, 11),
                    (Landmark::RightHip, 12),
                    (Landmark::LeftKnee, 13),
                    (Landmark::RightKnee, 14),
                    (Landmark::LeftAnkle, 15),
                    (Landmark::RightAnkle, 16),
                ]);
                Arc::new(Self {
                    name: MOVE_NET.to_string(),
                    size: 17,
                    edges,
                    landmarks,
                })
            })
            .clone()
    }
}

pub const BLAZE_POSE: &str = "blaze_pose";
pub const MOVE_NET: &str = "move_net";
