//! Wire frame format for the RPC core.
//!
//! A frame is the unit exchanged between client and server engines over the
//! underlying ordered byte-stream transport. Layout (big-endian, packed):
//!
//! ```text
//! offset 0  : u64 request_id
//! offset 8  : u8  message_type
//! offset 9  : u8  flags            (bit 0 = STREAMING, bits 1-7 reserved/zero)
//! offset 10 : 2 bytes reserved (zero)
//! offset 12 : i32 service_name_len
//!           : service_name bytes (utf8)
//!           : i32 method_name_len
//!           : method_name bytes (utf8)
//!           : i32 payload_len
//!           : payload bytes
//! ```
//!
//! The original reserved 3-byte field is split into one flags byte and two
//! bytes that stay reserved, per the forward-compatible extension suggested
//! for the streaming-request bit.

mod error_payload;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

pub use error_payload::{decode_error_payload, encode_error_payload, ErrorPayloadKind};

/// Fixed header size before the three length-prefixed fields begin.
const HEADER_LEN: usize = 12;

/// RPC message type, transmitted as a single byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 1,
    Response = 2,
    Error = 3,
    Complete = 4,
}

impl MessageType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => MessageType::Request,
            2 => MessageType::Response,
            3 => MessageType::Error,
            4 => MessageType::Complete,
            _ => return None,
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Request => "REQUEST",
            MessageType::Response => "RESPONSE",
            MessageType::Error => "ERROR",
            MessageType::Complete => "COMPLETE",
        };
        write!(f, "{s}")
    }
}

/// Bit 0 of the flags byte: this REQUEST was sent via `stream()`, not `call()`.
pub const FLAG_STREAMING: u8 = 0b0000_0001;

/// A decoded (or to-be-encoded) RPC message.
///
/// `payload` is an independent, owned buffer: decoding a frame out of a
/// transport-owned fragment buffer always copies, so a `RpcMessage`'s
/// lifetime never depends on the buffer it was parsed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcMessage {
    pub request_id: u64,
    pub message_type: MessageType,
    pub flags: u8,
    pub service_name: String,
    pub method_name: String,
    pub payload: Bytes,
}

impl RpcMessage {
    pub fn is_streaming(&self) -> bool {
        self.flags & FLAG_STREAMING != 0
    }

    /// Number of bytes `encode` will produce for this message.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + 4 + self.service_name.len()
            + 4 + self.method_name.len()
            + 4 + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Encode into a caller-provided scratch buffer, appending to it.
    ///
    /// Avoids an extra copy when the payload is already a contiguous `Bytes`
    /// handle: `put_slice` on a `Bytes` just memcpy's once into the target.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u64(self.request_id);
        buf.put_u8(self.message_type as u8);
        buf.put_u8(self.flags);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_i32(self.service_name.len() as i32);
        buf.put_slice(self.service_name.as_bytes());
        buf.put_i32(self.method_name.len() as i32);
        buf.put_slice(self.method_name.as_bytes());
        buf.put_i32(self.payload.len() as i32);
        buf.put_slice(&self.payload);
    }

    /// Decode a frame from a byte slice.
    ///
    /// Every declared length is checked against the remaining slice before
    /// use; a truncated or lying buffer yields `DecodeError::MalformedFrame`
    /// rather than an out-of-bounds read or panic.
    pub fn decode(mut buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::MalformedFrame("header truncated"));
        }
        let request_id = buf.get_u64();
        let type_byte = buf.get_u8();
        let message_type =
            MessageType::from_u8(type_byte).ok_or(DecodeError::MalformedFrame("unknown type"))?;
        let flags = buf.get_u8();
        let _reserved = buf.get_u16();

        let service_name = read_string(&mut buf)?;
        let method_name = read_string(&mut buf)?;
        let payload = read_bytes(&mut buf)?;

        Ok(RpcMessage {
            request_id,
            message_type,
            flags,
            service_name,
            method_name,
            payload,
        })
    }
}

fn read_len(buf: &mut &[u8]) -> Result<usize, DecodeError> {
    if buf.len() < 4 {
        return Err(DecodeError::MalformedFrame("length prefix truncated"));
    }
    let len = buf.get_i32();
    if len < 0 {
        return Err(DecodeError::MalformedFrame("negative length"));
    }
    let len = len as usize;
    if len > buf.len() {
        return Err(DecodeError::MalformedFrame("declared length overruns buffer"));
    }
    Ok(len)
}

fn read_bytes(buf: &mut &[u8]) -> Result<Bytes, DecodeError> {
    let len = read_len(buf)?;
    let out = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(out)
}

fn read_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    let len = read_len(buf)?;
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|_| DecodeError::MalformedFrame("non-utf8 string"))?
        .to_owned();
    buf.advance(len);
    Ok(s)
}

/// Error produced by [`RpcMessage::decode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    MalformedFrame(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedFrame(reason) => write!(f, "malformed frame: {reason}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RpcMessage {
        RpcMessage {
            request_id: 0xDEAD_BEEF_CAFE_BABE,
            message_type: MessageType::Response,
            flags: 0,
            service_name: "UserService".to_string(),
            method_name: "getUser".to_string(),
            payload: Bytes::from_static(b"{\"id\":\"u1\"}"),
        }
    }

    #[test]
    fn round_trip_preserves_fields() {
        let msg = sample();
        let encoded = msg.encode();
        let decoded = RpcMessage::decode(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn encoded_length_matches_scenario() {
        let msg = sample();
        let encoded = msg.encode();
        // 12 + 4+11 + 4+7 + 4+11 = 53
        assert_eq!(encoded.len(), 53);
        assert_eq!(msg.encoded_len(), 53);
    }

    #[test]
    fn rejects_truncated_header() {
        let msg = sample();
        let encoded = msg.encode();
        for cut in 0..HEADER_LEN {
            let result = RpcMessage::decode(&encoded[..cut]);
            assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));
        }
    }

    #[test]
    fn rejects_length_overrunning_buffer() {
        let msg = sample();
        let mut encoded = msg.encode();
        // truncate mid-payload: declared lengths still claim the full size
        let too_short = encoded.split_to(encoded.len() - 3);
        let result = RpcMessage::decode(&too_short);
        assert!(matches!(result, Err(DecodeError::MalformedFrame(_))));
    }

    #[test]
    fn rejects_unknown_type_byte() {
        let msg = sample();
        let mut encoded = msg.encode();
        encoded[8] = 0xFF;
        let result = RpcMessage::decode(&encoded);
        assert_eq!(result, Err(DecodeError::MalformedFrame("unknown type")));
    }

    #[test]
    fn reserved_bytes_are_ignored_and_written_zero() {
        let msg = sample();
        let encoded = msg.encode();
        assert_eq!(encoded[10], 0);
        assert_eq!(encoded[11], 0);
    }

    #[test]
    fn streaming_flag_round_trips() {
        let mut msg = sample();
        msg.message_type = MessageType::Request;
        msg.flags = FLAG_STREAMING;
        let encoded = msg.encode();
        let decoded = RpcMessage::decode(&encoded).unwrap();
        assert!(decoded.is_streaming());
    }

    #[test]
    fn accepts_every_declared_type() {
        for (byte, expected) in [
            (1u8, MessageType::Request),
            (2, MessageType::Response),
            (3, MessageType::Error),
            (4, MessageType::Complete),
        ] {
            let mut msg = sample();
            msg.message_type = expected;
            let encoded = msg.encode();
            assert_eq!(encoded[8], byte);
            let decoded = RpcMessage::decode(&encoded).unwrap();
            assert_eq!(decoded.message_type, expected);
        }
    }

    #[test]
    fn empty_strings_and_payload_round_trip() {
        let msg = RpcMessage {
            request_id: 0,
            message_type: MessageType::Complete,
            flags: 0,
            service_name: String::new(),
            method_name: String::new(),
            payload: Bytes::new(),
        };
        let encoded = msg.encode();
        assert_eq!(encoded.len(), HEADER_LEN + 12);
        let decoded = RpcMessage::decode(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }
}
