//! Binary value codec.
//!
//! Every value kind has a fixed layout; integers and floats are big-endian,
//! lengths and counts are `i32` prefixes:
//!
//! ```text
//! i32 / f32        4 bytes, network order (f32 as its bit pattern)
//! string           len:i32 | len raw bytes
//! sequence<T>      count:i32 | count * T
//! transform        sequence<f32> of 16, row-major
//! intrinsics       px:f32 | py:f32 | u0:f32 | v0:f32
//! color image      h:i32 | w:i32 | c:i32 | h*w*c bytes
//! depth image      h:i32 | w:i32 | marker:u8 | h*w*2 bytes, host order
//! ```
//!
//! The depth image is the one layout that is not converted to network order:
//! its marker byte is `'>'` for a big-endian sender and `'<'` otherwise, and
//! the receiver swaps when the marker disagrees with its own order.
//!
//! Decoding is bounds-checked; a short buffer is an error, never a panic.

use crate::error::ProtocolError;
use crate::types::{CameraIntrinsics, ColorImage, DepthImage, Transform, RGBA_CHANNELS};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Marker byte for depth pixels stored big-endian.
pub const BIG_ENDIAN_MARKER: u8 = b'>';

/// Marker byte for depth pixels stored little-endian.
pub const LITTLE_ENDIAN_MARKER: u8 = b'<';

/// Marker describing this host's byte order.
pub const fn host_endian_marker() -> u8 {
    if cfg!(target_endian = "big") {
        BIG_ENDIAN_MARKER
    } else {
        LITTLE_ENDIAN_MARKER
    }
}

/// Appends the wire representation of a value.
pub trait WireEncode {
    fn encode(&self, buf: &mut BytesMut);
}

/// Reads a value back, advancing the buffer past the consumed bytes.
pub trait WireDecode: Sized {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError>;
}

/// Encodes a value into a fresh buffer.
pub fn to_bytes<T: WireEncode + ?Sized>(value: &T) -> BytesMut {
    let mut buf = BytesMut::new();
    value.encode(&mut buf);
    buf
}

/// Reads a length-prefixed string as raw bytes, without UTF-8 validation.
pub fn decode_byte_string(buf: &mut Bytes) -> Result<Bytes, ProtocolError> {
    let len = decode_len(buf)?;
    ensure(buf, len)?;
    Ok(buf.split_to(len))
}

fn ensure(buf: &Bytes, needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn decode_len(buf: &mut Bytes) -> Result<usize, ProtocolError> {
    let len = i32::decode(buf)?;
    usize::try_from(len).map_err(|_| ProtocolError::NegativeLength(len))
}

/// Lengths are clamped to `i32` when written; payloads that large are rejected
/// at the frame layer.
fn encode_len(len: usize, buf: &mut BytesMut) {
    (len.min(i32::MAX as usize) as i32).encode(buf);
}

/// Reads `h:i32 | w:i32` and returns the shape with its byte size for
/// `bytes_per_pixel`.
fn decode_shape(
    buf: &mut Bytes,
    bytes_per_pixel: usize,
) -> Result<(u32, u32, usize), ProtocolError> {
    let height = i32::decode(buf)?;
    let width = i32::decode(buf)?;
    if height < 0 || width < 0 {
        return Err(ProtocolError::InvalidDimensions { height, width });
    }
    let size = (height as usize)
        .checked_mul(width as usize)
        .and_then(|n| n.checked_mul(bytes_per_pixel))
        .ok_or(ProtocolError::InvalidDimensions { height, width })?;
    Ok((height as u32, width as u32, size))
}

// Scalars

impl WireEncode for i32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(*self);
    }
}

impl WireDecode for i32 {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure(buf, 4)?;
        Ok(buf.get_i32())
    }
}

impl WireEncode for f32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.to_bits());
    }
}

impl WireDecode for f32 {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        ensure(buf, 4)?;
        Ok(f32::from_bits(buf.get_u32()))
    }
}

// Strings

impl WireEncode for str {
    fn encode(&self, buf: &mut BytesMut) {
        encode_len(self.len(), buf);
        buf.put_slice(self.as_bytes());
    }
}

impl WireEncode for String {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_str().encode(buf);
    }
}

impl WireDecode for String {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let raw = decode_byte_string(buf)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

// Sequences

impl<T: WireEncode> WireEncode for [T] {
    fn encode(&self, buf: &mut BytesMut) {
        encode_len(self.len(), buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_slice().encode(buf);
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let count = decode_len(buf)?;
        // Every element takes at least one byte; cap the reservation so a
        // bogus count cannot trigger a huge allocation.
        let mut items = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }
}

impl<T: WireEncode + ?Sized> WireEncode for &T {
    fn encode(&self, buf: &mut BytesMut) {
        (**self).encode(buf);
    }
}

// Left-to-right composition of heterogeneous values.
macro_rules! impl_wire_tuple {
    ($($name:ident),+) => {
        impl<$($name: WireEncode),+> WireEncode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode(&self, buf: &mut BytesMut) {
                let ($($name,)+) = self;
                $($name.encode(buf);)+
            }
        }

        impl<$($name: WireDecode),+> WireDecode for ($($name,)+) {
            fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
                Ok(($($name::decode(buf)?,)+))
            }
        }
    };
}

impl_wire_tuple!(A, B);
impl_wire_tuple!(A, B, C);
impl_wire_tuple!(A, B, C, D);

// Geometry

impl WireEncode for Transform {
    fn encode(&self, buf: &mut BytesMut) {
        let values: Vec<f32> = self.as_row_major().iter().map(|&v| v as f32).collect();
        values.encode(buf);
    }
}

impl WireDecode for Transform {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let values = Vec::<f32>::decode(buf)?;
        Transform::try_from(values.into_iter().map(f64::from).collect::<Vec<_>>())
    }
}

impl WireEncode for CameraIntrinsics {
    fn encode(&self, buf: &mut BytesMut) {
        (
            self.px as f32,
            self.py as f32,
            self.u0 as f32,
            self.v0 as f32,
        )
            .encode(buf);
    }
}

impl WireDecode for CameraIntrinsics {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let (px, py, u0, v0) = <(f32, f32, f32, f32)>::decode(buf)?;
        Ok(CameraIntrinsics::new(
            f64::from(px),
            f64::from(py),
            f64::from(u0),
            f64::from(v0),
        ))
    }
}

// Images

impl WireEncode for ColorImage {
    fn encode(&self, buf: &mut BytesMut) {
        let bytes = self.as_bytes();
        buf.reserve(12 + bytes.len());
        (
            self.height() as i32,
            self.width() as i32,
            RGBA_CHANNELS as i32,
        )
            .encode(buf);
        buf.put_slice(bytes);
    }
}

impl WireDecode for ColorImage {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let (height, width, count) = decode_shape(buf, 1)?;
        let channels = i32::decode(buf)?;

        let pixels = match channels {
            4 => {
                let size = count.saturating_mul(RGBA_CHANNELS);
                ensure(buf, size)?;
                buf.split_to(size).to_vec()
            }
            3 => {
                let size = count.saturating_mul(3);
                ensure(buf, size)?;
                let rgb = buf.split_to(size);
                let mut rgba = Vec::with_capacity(count * RGBA_CHANNELS);
                for px in rgb.chunks_exact(3) {
                    rgba.extend_from_slice(px);
                    rgba.push(u8::MAX);
                }
                rgba
            }
            other => return Err(ProtocolError::UnsupportedChannels(other)),
        };

        ColorImage::new(height, width, pixels)
    }
}

impl WireEncode for DepthImage {
    fn encode(&self, buf: &mut BytesMut) {
        let pixels = self.as_slice();
        buf.reserve(9 + pixels.len() * 2);
        (self.height() as i32, self.width() as i32).encode(buf);
        buf.put_u8(host_endian_marker());
        for px in pixels {
            buf.put_slice(&px.to_ne_bytes());
        }
    }
}

impl WireDecode for DepthImage {
    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let (height, width, size) = decode_shape(buf, 2)?;
        ensure(buf, 1)?;
        let marker = buf.get_u8();
        let read: fn([u8; 2]) -> u16 = match marker {
            BIG_ENDIAN_MARKER => u16::from_be_bytes,
            LITTLE_ENDIAN_MARKER => u16::from_le_bytes,
            other => return Err(ProtocolError::InvalidEndianMarker(other)),
        };

        ensure(buf, size)?;
        let raw = buf.split_to(size);
        let pixels = raw
            .chunks_exact(2)
            .map(|b| read([b[0], b[1]]))
            .collect();

        DepthImage::new(height, width, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip<T: WireEncode + WireDecode>(value: &T) -> (T, usize) {
        let encoded = to_bytes(value);
        let mut buf = encoded.freeze();
        let decoded = T::decode(&mut buf).unwrap();
        (decoded, buf.remaining())
    }

    #[test]
    fn test_int_is_big_endian() {
        let encoded = to_bytes(&0x0102_0304i32);
        assert_eq!(&encoded[..], &[1, 2, 3, 4]);

        let encoded = to_bytes(&-1i32);
        assert_eq!(&encoded[..], &[0xFF; 4]);
    }

    #[test]
    fn test_float_is_big_endian_bit_pattern() {
        let encoded = to_bytes(&1.0f32);
        assert_eq!(&encoded[..], &[0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_float_nan_bits_preserved() {
        let nan = f32::from_bits(0x7FC0_1234);
        let (decoded, rest) = roundtrip(&nan);
        assert_eq!(decoded.to_bits(), 0x7FC0_1234);
        assert_eq!(rest, 0);
    }

    #[test]
    fn test_string_layout() {
        let encoded = to_bytes("cup");
        assert_eq!(&encoded[..], &[0, 0, 0, 3, b'c', b'u', b'p']);

        let (decoded, _) = roundtrip(&String::new());
        assert_eq!(decoded, "");
    }

    #[test]
    fn test_sequence_layout() {
        let encoded = to_bytes(&vec![1i32, 2]);
        assert_eq!(&encoded[..], &[0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn test_tuple_concatenates_left_to_right() {
        let encoded = to_bytes(&(7i32, "a", 2.0f32));
        assert_eq!(
            &encoded[..],
            &[0, 0, 0, 7, 0, 0, 0, 1, b'a', 0x40, 0, 0, 0]
        );

        let mut buf = encoded.freeze();
        let (n, s, f) = <(i32, String, f32)>::decode(&mut buf).unwrap();
        assert_eq!((n, s.as_str(), f), (7, "a", 2.0));
    }

    #[test]
    fn test_transform_layout() {
        let t = Transform::from_translation(0.5, 0.25, 2.0);
        let encoded = to_bytes(&t);
        assert_eq!(encoded.len(), 4 + 16 * 4);
        assert_eq!(&encoded[..4], &[0, 0, 0, 16]);
        // Row 0, column 3 is the x translation
        assert_eq!(&encoded[4 + 3 * 4..4 + 4 * 4], &0.5f32.to_be_bytes());

        let (decoded, rest) = roundtrip(&t);
        assert_eq!(decoded, t);
        assert_eq!(rest, 0);
    }

    #[test]
    fn test_transform_wrong_count() {
        let mut buf = to_bytes(&vec![1.0f32; 9]).freeze();
        let result = Transform::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::InvalidMatrixLength(9))));
    }

    #[test]
    fn test_intrinsics_have_no_count_prefix() {
        let cam = CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0);
        let encoded = to_bytes(&cam);
        assert_eq!(encoded.len(), 16);
        assert_eq!(&encoded[..4], &600.0f32.to_be_bytes());

        let (decoded, _) = roundtrip(&cam);
        assert_eq!(decoded, cam);
    }

    #[test]
    fn test_color_image_layout() {
        let img = ColorImage::new(1, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let encoded = to_bytes(&img);
        assert_eq!(
            &encoded[..],
            &[0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 4, 1, 2, 3, 4, 5, 6, 7, 8]
        );

        let (decoded, rest) = roundtrip(&img);
        assert_eq!(decoded, img);
        assert_eq!(rest, 0);
    }

    #[test]
    fn test_color_image_expands_rgb() {
        let mut raw = to_bytes(&(1i32, 2i32, 3i32));
        raw.put_slice(&[10, 20, 30, 40, 50, 60]);
        let mut buf = raw.freeze();

        let img = ColorImage::decode(&mut buf).unwrap();
        assert_eq!(img.pixel(0, 0), Some([10, 20, 30, 255]));
        assert_eq!(img.pixel(0, 1), Some([40, 50, 60, 255]));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_color_image_rejects_other_channel_counts() {
        let mut buf = to_bytes(&(1i32, 1i32, 1i32, 0i32)).freeze();
        let result = ColorImage::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnsupportedChannels(1))));
    }

    #[test]
    fn test_color_image_negative_dimensions() {
        let mut buf = to_bytes(&(-1i32, 4i32, 4i32)).freeze();
        let result = ColorImage::decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidDimensions { height: -1, .. })
        ));
    }

    #[test]
    fn test_depth_image_host_order_marker() {
        let depth = DepthImage::new(1, 2, vec![0x0102, 0xA0B0]).unwrap();
        let encoded = to_bytes(&depth);
        assert_eq!(encoded.len(), 4 + 4 + 1 + 4);
        assert_eq!(encoded[8], host_endian_marker());
        assert_eq!(&encoded[9..11], &0x0102u16.to_ne_bytes());

        let (decoded, rest) = roundtrip(&depth);
        assert_eq!(decoded, depth);
        assert_eq!(rest, 0);
    }

    #[test]
    fn test_depth_image_big_endian_marker() {
        let mut raw = to_bytes(&(1i32, 2i32));
        raw.put_u8(b'>');
        raw.put_slice(&[0x01, 0x02, 0xA0, 0xB0]);
        let decoded = DepthImage::decode(&mut raw.freeze()).unwrap();
        assert_eq!(decoded.as_slice(), &[0x0102, 0xA0B0]);
    }

    #[test]
    fn test_depth_image_little_endian_marker() {
        let mut raw = to_bytes(&(1i32, 2i32));
        raw.put_u8(b'<');
        raw.put_slice(&[0x02, 0x01, 0xB0, 0xA0]);
        let decoded = DepthImage::decode(&mut raw.freeze()).unwrap();
        assert_eq!(decoded.as_slice(), &[0x0102, 0xA0B0]);
    }

    #[test]
    fn test_depth_image_invalid_marker() {
        let mut raw = to_bytes(&(0i32, 0i32));
        raw.put_u8(b'=');
        let result = DepthImage::decode(&mut raw.freeze());
        assert!(matches!(result, Err(ProtocolError::InvalidEndianMarker(b'='))));
    }

    #[test]
    fn test_truncated_inputs_error() {
        let mut buf = Bytes::from_static(&[0, 0]);
        assert!(matches!(
            i32::decode(&mut buf),
            Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 2
            })
        ));

        // String claims 10 bytes, only 3 follow
        let mut buf = Bytes::from_static(&[0, 0, 0, 10, b'a', b'b', b'c']);
        assert!(matches!(
            String::decode(&mut buf),
            Err(ProtocolError::Truncated { needed: 10, .. })
        ));

        // Image claims 2x2 RGBA, payload is short
        let mut raw = to_bytes(&(2i32, 2i32, 4i32));
        raw.put_slice(&[0; 5]);
        assert!(matches!(
            ColorImage::decode(&mut raw.freeze()),
            Err(ProtocolError::Truncated { needed: 16, .. })
        ));
    }

    #[test]
    fn test_byte_string_keeps_raw_bytes() {
        let mut buf = Bytes::from_static(&[0, 0, 0, 2, 0xFF, b'x', 9]);
        let raw = decode_byte_string(&mut buf).unwrap();
        assert_eq!(&raw[..], &[0xFF, b'x']);
        assert_eq!(buf.remaining(), 1);

        let mut buf = Bytes::new();
        assert!(matches!(
            decode_byte_string(&mut buf),
            Err(ProtocolError::Truncated { needed: 4, .. })
        ));
    }

    #[test]
    fn test_negative_length_prefix() {
        let mut buf = to_bytes(&-5i32).freeze();
        assert!(matches!(
            String::decode(&mut buf),
            Err(ProtocolError::NegativeLength(-5))
        ));

        let mut buf = to_bytes(&-1i32).freeze();
        assert!(matches!(
            Vec::<i32>::decode(&mut buf),
            Err(ProtocolError::NegativeLength(-1))
        ));
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        let mut buf = to_bytes(&i32::MAX).freeze();
        assert!(matches!(
            Vec::<f32>::decode(&mut buf),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = Bytes::from_static(&[0, 0, 0, 2, 0xC3, 0x28]);
        assert!(matches!(
            String::decode(&mut buf),
            Err(ProtocolError::InvalidUtf8)
        ));
    }

    proptest! {
        #[test]
        fn prop_i32_roundtrip(v in any::<i32>()) {
            let (decoded, rest) = roundtrip(&v);
            prop_assert_eq!(decoded, v);
            prop_assert_eq!(rest, 0);
        }

        #[test]
        fn prop_f32_roundtrip_bit_exact(bits in any::<u32>()) {
            let v = f32::from_bits(bits);
            let (decoded, _) = roundtrip(&v);
            prop_assert_eq!(decoded.to_bits(), bits);
        }

        #[test]
        fn prop_string_roundtrip(s in ".*") {
            let (decoded, rest) = roundtrip(&s);
            prop_assert_eq!(decoded, s);
            prop_assert_eq!(rest, 0);
        }

        #[test]
        fn prop_strings_sequence_roundtrip(v in proptest::collection::vec(".{0,8}", 0..8)) {
            let (decoded, _) = roundtrip(&v);
            prop_assert_eq!(decoded, v);
        }

        #[test]
        fn prop_color_image_roundtrip(h in 0u32..6, w in 0u32..6, seed in any::<u8>()) {
            let len = (h * w) as usize * RGBA_CHANNELS;
            let pixels: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect();
            let img = ColorImage::new(h, w, pixels).unwrap();
            let (decoded, rest) = roundtrip(&img);
            prop_assert_eq!(decoded, img);
            prop_assert_eq!(rest, 0);
        }

        #[test]
        fn prop_depth_image_roundtrip(pixels in proptest::collection::vec(any::<u16>(), 0..24)) {
            let width = pixels.len() as u32;
            let depth = DepthImage::new(1, width, pixels).unwrap();
            let (decoded, _) = roundtrip(&depth);
            prop_assert_eq!(decoded, depth);
        }

        #[test]
        fn prop_truncation_never_panics(cut in 0usize..40) {
            let img = ColorImage::filled(2, 3, [9, 8, 7, 6]).unwrap();
            let encoded = to_bytes(&img);
            let cut = cut.min(encoded.len() - 1);
            let mut buf = Bytes::copy_from_slice(&encoded[..cut]);
            prop_assert!(ColorImage::decode(&mut buf).is_err());
        }
    }
}
