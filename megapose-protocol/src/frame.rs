//! Message framing.
//!
//! Frame layout (8 bytes header + payload):
//!
//! ```text
//! +-------------+----------+---------------------+
//! | payload_len | code tag | payload             |
//! | 4 bytes BE  | 4 ASCII  | payload_len bytes   |
//! +-------------+----------+---------------------+
//! ```
//!
//! The length counts only the payload, never the header.

use crate::codec::WireEncode;
use crate::error::ProtocolError;
use crate::message::{MessageCode, TAG_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the fixed frame header in bytes (4 + 4).
pub const FRAME_HEADER_SIZE: usize = 4 + TAG_SIZE;

/// Largest payload a frame can describe; the length field is a signed 32-bit value.
pub const MAX_FRAME_PAYLOAD: usize = i32::MAX as usize;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload byte count.
    pub length: u32,
    /// Decoded message code (`Unknown` for unmapped tags).
    pub code: MessageCode,
    /// Raw tag as received.
    pub tag: [u8; TAG_SIZE],
}

impl FrameHeader {
    /// Parses the 8 header bytes.
    pub fn parse(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let tag = [bytes[4], bytes[5], bytes[6], bytes[7]];
        Self {
            length,
            code: MessageCode::from_tag(&tag),
            tag,
        }
    }

    /// Tag rendered for diagnostics.
    pub fn tag_lossy(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// One coded unit of wire communication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: MessageCode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(code: MessageCode, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// Builds a frame whose payload is the encoding of `value`.
    pub fn from_value<T: WireEncode + ?Sized>(code: MessageCode, value: &T) -> Self {
        Self::new(code, crate::codec::to_bytes(value).freeze())
    }

    /// Builds a frame carrying a JSON document as a length-prefixed string.
    pub fn from_json<T: serde::Serialize>(
        code: MessageCode,
        value: &T,
    ) -> Result<Self, ProtocolError> {
        let json = serde_json::to_string(value)?;
        Ok(Self::from_value(code, json.as_str()))
    }

    /// Encodes header and payload into one buffer.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let tag = self.code.tag().ok_or(ProtocolError::UnencodableCode)?;
        if self.payload.len() > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload.len() as u64,
                max: MAX_FRAME_PAYLOAD as u64,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        (self.payload.len() as i32).encode(&mut buf);
        buf.put_slice(&tag);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes one complete frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` if more data is needed. Consumed bytes are removed
    /// from `buf`.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        Self::decode_with_limit(buf, MAX_FRAME_PAYLOAD)
    }

    /// Like [`Frame::decode`], rejecting headers that declare more than
    /// `max_payload` bytes before any payload is buffered.
    pub fn decode_with_limit(
        buf: &mut BytesMut,
        max_payload: usize,
    ) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let mut head = [0u8; FRAME_HEADER_SIZE];
        head.copy_from_slice(&buf[..FRAME_HEADER_SIZE]);
        let header = FrameHeader::parse(&head);

        let limit = max_payload.min(MAX_FRAME_PAYLOAD);
        if header.length as usize > limit {
            return Err(ProtocolError::FrameTooLarge {
                size: u64::from(header.length),
                max: limit as u64,
            });
        }

        let total = FRAME_HEADER_SIZE + header.length as usize;
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame = buf.split_to(total);
        let payload = frame.split_off(FRAME_HEADER_SIZE).freeze();
        Ok(Some(Self {
            code: header.code,
            payload,
        }))
    }
}
