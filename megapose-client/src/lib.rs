//! # megapose-client
//!
//! Blocking client library for the MegaPose pose-estimation server.
//!
//! This crate provides:
//! - A byte-exact TCP transport with optional per-I/O deadlines
//! - The RPC surface: intrinsics, pose estimation, scoring, rendering, solver tuning
//! - A single-object tracker built on the client
//!
//! Requests on one [`Client`] are strictly serialized. Nothing is retried and
//! the connection is never re-established automatically.

pub mod client;
pub mod connection;
pub mod error;
pub mod tracker;

pub use client::{Client, PoseQuery};
pub use connection::{ConnectionConfig, Transport};
pub use error::{ClientError, ErrorKind};
pub use tracker::{PendingEstimate, PoseTracker};

pub use megapose_protocol::{
    BoundingBox, CameraIntrinsics, ColorImage, DepthImage, PoseEstimate, Transform,
};
