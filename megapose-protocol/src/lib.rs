//! # megapose-protocol
//!
//! Wire protocol for the MegaPose pose-estimation server.
//!
//! This crate provides:
//! - A bounds-checked binary codec for scalars, strings, sequences, images and matrices
//! - The message code table (4-byte ASCII tags)
//! - Length-prefixed framing
//! - The JSON parameter and result documents carried inside frames

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod types;

pub use codec::{WireDecode, WireEncode};
pub use error::ProtocolError;
pub use frame::{Frame, FrameHeader, FRAME_HEADER_SIZE};
pub use message::{MessageCode, PoseEstimate, PoseRecord};
pub use types::{BoundingBox, CameraIntrinsics, ColorImage, DepthImage, Transform};

/// Default port of the MegaPose server.
pub const DEFAULT_PORT: u16 = 5555;
