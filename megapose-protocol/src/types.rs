//! Value types carried by the protocol.
//!
//! These are plain typed buffers with a known byte layout. No image or matrix
//! math lives here; callers convert from their own representations.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Number of interleaved channels in a [`ColorImage`].
pub const RGBA_CHANNELS: usize = 4;

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length along x, in pixels.
    pub px: f64,
    /// Focal length along y, in pixels.
    pub py: f64,
    /// Principal point x coordinate.
    pub u0: f64,
    /// Principal point y coordinate.
    pub v0: f64,
}

impl CameraIntrinsics {
    pub fn new(px: f64, py: f64, u0: f64, v0: f64) -> Self {
        Self { px, py, u0, v0 }
    }
}

/// Rigid 4x4 homogeneous transform, row-major.
///
/// Serialized to JSON as a flat array of 16 numbers; on the binary wire it is
/// sent as a sequence of 16 `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Transform([f64; 16]);

impl Transform {
    pub const IDENTITY: Transform = Transform([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn from_row_major(values: [f64; 16]) -> Self {
        Self(values)
    }

    /// Builds a pure translation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        let mut values = Self::IDENTITY.0;
        values[3] = x;
        values[7] = y;
        values[11] = z;
        Self(values)
    }

    pub fn as_row_major(&self) -> &[f64; 16] {
        &self.0
    }

    /// Coefficient at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is not below 4.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(row < 4 && col < 4, "transform index out of range");
        self.0[row * 4 + col]
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.0[3], self.0[7], self.0[11]]
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<Vec<f64>> for Transform {
    type Error = ProtocolError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        let len = values.len();
        let array: [f64; 16] = values
            .try_into()
            .map_err(|_| ProtocolError::InvalidMatrixLength(len))?;
        Ok(Self(array))
    }
}

impl From<Transform> for Vec<f64> {
    fn from(t: Transform) -> Self {
        t.0.to_vec()
    }
}

/// Axis-aligned detection box in pixel coordinates.
///
/// Serialized to JSON as `[left, top, right, bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Builds a box from its top-left corner and size.
    pub fn from_origin_size(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.left, b.top, b.right, b.bottom]
    }
}

/// RGBA color image, row-major with interleaved channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorImage {
    height: u32,
    width: u32,
    pixels: Vec<u8>,
}

impl ColorImage {
    /// Wraps an interleaved RGBA buffer of `height * width * 4` bytes.
    pub fn new(height: u32, width: u32, pixels: Vec<u8>) -> Result<Self, ProtocolError> {
        check_dimensions(height, width)?;
        let expected = height as usize * width as usize * RGBA_CHANNELS;
        if pixels.len() != expected {
            return Err(ProtocolError::PixelCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            height,
            width,
            pixels,
        })
    }

    /// Creates an image with every pixel set to `rgba`.
    pub fn filled(height: u32, width: u32, rgba: [u8; 4]) -> Result<Self, ProtocolError> {
        check_dimensions(height, width)?;
        let count = height as usize * width as usize;
        let pixels = rgba.iter().copied().cycle().take(count * RGBA_CHANNELS).collect();
        Ok(Self {
            height,
            width,
            pixels,
        })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at `(row, col)`, or `None` when out of bounds.
    pub fn pixel(&self, row: u32, col: u32) -> Option<[u8; 4]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let start = (row as usize * self.width as usize + col as usize) * RGBA_CHANNELS;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[start..start + RGBA_CHANNELS]);
        Some(px)
    }
}

/// Single-channel 16-bit depth image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthImage {
    height: u32,
    width: u32,
    pixels: Vec<u16>,
}

impl DepthImage {
    pub fn new(height: u32, width: u32, pixels: Vec<u16>) -> Result<Self, ProtocolError> {
        check_dimensions(height, width)?;
        let expected = height as usize * width as usize;
        if pixels.len() != expected {
            return Err(ProtocolError::PixelCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            height,
            width,
            pixels,
        })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.pixels
    }

    pub fn get(&self, row: u32, col: u32) -> Option<u16> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.pixels
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }
}

/// Dimensions travel as `i32` on the wire.
fn check_dimensions(height: u32, width: u32) -> Result<(), ProtocolError> {
    if height > i32::MAX as u32 || width > i32::MAX as u32 {
        return Err(ProtocolError::InvalidDimensions {
            height: height as i32,
            width: width as i32,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_json_is_flat_row_major() {
        let t = Transform::from_translation(0.1, -0.2, 1.5);
        let json = serde_json::to_value(t).unwrap();
        let values = json.as_array().unwrap();
        assert_eq!(values.len(), 16);
        assert_eq!(values[3], 0.1);
        assert_eq!(values[7], -0.2);
        assert_eq!(values[11], 1.5);
        assert_eq!(values[15], 1.0);
    }

    #[test]
    fn test_transform_rejects_wrong_length() {
        let result: Result<Transform, _> = serde_json::from_str("[1.0, 2.0, 3.0]");
        assert!(result.is_err());

        let result = Transform::try_from(vec![0.0; 9]);
        assert!(matches!(result, Err(ProtocolError::InvalidMatrixLength(9))));
    }

    #[test]
    fn test_transform_accessors() {
        let t = Transform::from_translation(1.0, 2.0, 3.0);
        assert_eq!(t.translation(), [1.0, 2.0, 3.0]);
        assert_eq!(t.get(0, 3), 1.0);
        assert_eq!(t.get(3, 3), 1.0);
        assert_eq!(Transform::default(), Transform::IDENTITY);
    }

    #[test]
    fn test_bounding_box_json() {
        let bb = BoundingBox::from_origin_size(10.0, 20.0, 30.0, 40.0);
        assert_eq!(bb.width(), 30.0);
        assert_eq!(bb.height(), 40.0);

        let json = serde_json::to_string(&bb).unwrap();
        assert_eq!(json, "[10.0,20.0,40.0,60.0]");

        let parsed: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, bb);
    }

    #[test]
    fn test_color_image_shape_validation() {
        let result = ColorImage::new(2, 2, vec![0; 15]);
        assert!(matches!(
            result,
            Err(ProtocolError::PixelCountMismatch {
                expected: 16,
                actual: 15
            })
        ));

        let img = ColorImage::filled(2, 3, [1, 2, 3, 4]).unwrap();
        assert_eq!(img.as_bytes().len(), 24);
        assert_eq!(img.pixel(1, 2), Some([1, 2, 3, 4]));
        assert_eq!(img.pixel(2, 0), None);
    }

    #[test]
    fn test_depth_image_shape_validation() {
        assert!(DepthImage::new(2, 2, vec![0; 3]).is_err());

        let depth = DepthImage::new(2, 2, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(depth.get(1, 0), Some(3));
        assert_eq!(depth.get(0, 2), None);
    }

    #[test]
    fn test_empty_images_are_valid() {
        assert!(ColorImage::new(0, 0, Vec::new()).is_ok());
        assert!(DepthImage::new(0, 5, Vec::new()).is_ok());
    }
}
