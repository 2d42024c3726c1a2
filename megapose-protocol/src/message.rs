//! Message codes and the JSON documents exchanged with the server.

use crate::types::{BoundingBox, CameraIntrinsics, Transform};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a message code tag on the wire.
pub const TAG_SIZE: usize = 4;

/// Protocol operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    Error,
    Ok,
    GetPose,
    RetPose,
    SetIntrinsics,
    GetVisualization,
    RetVisualization,
    GetScore,
    RetScore,
    SetSolverParam,
    /// Sentinel for tags not in the table.
    Unknown,
}

/// Code to tag table. Injective; `Unknown` has no entry.
const CODE_TABLE: [(MessageCode, [u8; TAG_SIZE]); 10] = [
    (MessageCode::Error, *b"RERR"),
    (MessageCode::Ok, *b"OKOK"),
    (MessageCode::GetPose, *b"GETP"),
    (MessageCode::RetPose, *b"RETP"),
    (MessageCode::SetIntrinsics, *b"INTR"),
    (MessageCode::GetVisualization, *b"GETV"),
    (MessageCode::RetVisualization, *b"RETV"),
    (MessageCode::GetScore, *b"GSCO"),
    (MessageCode::RetScore, *b"RSCO"),
    (MessageCode::SetSolverParam, *b"SO3G"),
];

impl MessageCode {
    /// Every code that has a wire tag.
    pub const ALL: [MessageCode; 10] = [
        MessageCode::Error,
        MessageCode::Ok,
        MessageCode::GetPose,
        MessageCode::RetPose,
        MessageCode::SetIntrinsics,
        MessageCode::GetVisualization,
        MessageCode::RetVisualization,
        MessageCode::GetScore,
        MessageCode::RetScore,
        MessageCode::SetSolverParam,
    ];

    /// Wire tag, or `None` for `Unknown`.
    pub fn tag(self) -> Option<[u8; TAG_SIZE]> {
        CODE_TABLE
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, tag)| *tag)
    }

    /// Looks up a tag; unmapped tags yield `Unknown`.
    pub fn from_tag(tag: &[u8]) -> Self {
        CODE_TABLE
            .iter()
            .find(|(_, t)| t.as_slice() == tag)
            .map(|(code, _)| *code)
            .unwrap_or(MessageCode::Unknown)
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Some(tag) => f.write_str(std::str::from_utf8(&tag).unwrap_or("????")),
            None => f.write_str("UNKNOWN"),
        }
    }
}

// =========================================================================
// Request documents
// =========================================================================

/// Parameters of a SET_INTRINSICS request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsParams {
    pub px: f64,
    pub py: f64,
    pub u0: f64,
    pub v0: f64,
    pub h: u32,
    pub w: u32,
}

impl IntrinsicsParams {
    pub fn new(intrinsics: &CameraIntrinsics, height: u32, width: u32) -> Self {
        Self {
            px: intrinsics.px,
            py: intrinsics.py,
            u0: intrinsics.u0,
            v0: intrinsics.v0,
            h: height,
            w: width,
        }
    }
}

/// Parameters of a GET_POSE request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseParams {
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<BoundingBox>>,

    #[serde(
        rename = "initial_cTos",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub initial_poses: Option<Vec<Transform>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refiner_iterations: Option<u32>,

    pub use_depth: bool,

    #[serde(
        rename = "depth_scale_to_m",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub depth_scale: Option<f64>,
}

/// Parameters of a GET_SCORE request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreParams {
    #[serde(rename = "cTos")]
    pub poses: Vec<Transform>,
    pub labels: Vec<String>,
}

/// Parameters of a GET_VISUALIZATION request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
    pub labels: Vec<String>,
    pub poses: Vec<Transform>,
    #[serde(rename = "type")]
    pub view_kind: String,
}

/// Parameters of a SET_SOLVER_PARAM request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverParams {
    pub so3_grid_size: u32,
}

// =========================================================================
// Result documents
// =========================================================================

/// One object's estimate as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    #[serde(rename = "cTo")]
    pub pose: Transform,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(
        rename = "boundingBox",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bounding_box: Option<BoundingBox>,
}

/// Pose estimate for one labelled object.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    pub label: String,
    pub pose: Transform,
    pub score: Option<f64>,
    pub bounding_box: Option<BoundingBox>,
}

impl PoseEstimate {
    pub fn from_record(label: impl Into<String>, record: PoseRecord) -> Self {
        Self {
            label: label.into(),
            pose: record.pose,
            score: record.score,
            bounding_box: record.bounding_box,
        }
    }
}

/// Score reply, either a bare array or wrapped in an object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScoreReply {
    Bare(Vec<f64>),
    Wrapped { scores: Vec<f64> },
}

impl ScoreReply {
    pub fn into_scores(self) -> Vec<f64> {
        match self {
            ScoreReply::Bare(scores) | ScoreReply::Wrapped { scores } => scores,
        }
    }
}
