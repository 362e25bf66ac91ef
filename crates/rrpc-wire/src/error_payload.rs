//! Self-describing ERROR payload: a one-byte kind discriminator followed by
//! a UTF-8 message, reserving the first byte so future kinds can be added
//! without breaking older readers. Only error kinds that can actually cross
//! the wire are represented here; purely client-local kinds (rate limiting,
//! send timeouts, cancellation, no-endpoints) never reach this encoding.

use bytes::{Bytes, BytesMut};
use std::fmt;

/// Discriminator for the kind of error carried in an ERROR frame's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorPayloadKind {
    ServiceNotFound = 1,
    HandlerError = 2,
    Overloaded = 3,
    ReplyTimeout = 4,
    SerializationError = 5,
}

impl ErrorPayloadKind {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => ErrorPayloadKind::ServiceNotFound,
            2 => ErrorPayloadKind::HandlerError,
            3 => ErrorPayloadKind::Overloaded,
            4 => ErrorPayloadKind::ReplyTimeout,
            5 => ErrorPayloadKind::SerializationError,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorPayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorPayloadKind::ServiceNotFound => "ServiceNotFound",
            ErrorPayloadKind::HandlerError => "HandlerError",
            ErrorPayloadKind::Overloaded => "Overloaded",
            ErrorPayloadKind::ReplyTimeout => "ReplyTimeout",
            ErrorPayloadKind::SerializationError => "SerializationError",
        };
        write!(f, "{s}")
    }
}

/// Encode an ERROR payload as `[kind byte][utf8 message]`.
pub fn encode_error_payload(kind: ErrorPayloadKind, message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + message.len());
    buf.extend_from_slice(&[kind as u8]);
    buf.extend_from_slice(message.as_bytes());
    buf.freeze()
}

/// Decode an ERROR payload produced by [`encode_error_payload`].
///
/// Payloads from peers that predate the discriminator (or that otherwise
/// don't start with a recognized kind byte) are treated as a bare
/// `HandlerError` message for backward compatibility, matching the
/// "implementers SHOULD" (not MUST) framing of the discriminator.
pub fn decode_error_payload(payload: &[u8]) -> (ErrorPayloadKind, String) {
    match payload.split_first() {
        Some((&byte, rest)) if ErrorPayloadKind::from_u8(byte).is_some() => {
            let kind = ErrorPayloadKind::from_u8(byte).unwrap();
            (kind, String::from_utf8_lossy(rest).into_owned())
        }
        _ => (
            ErrorPayloadKind::HandlerError,
            String::from_utf8_lossy(payload).into_owned(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = encode_error_payload(ErrorPayloadKind::ServiceNotFound, "no such service: foo");
        let (kind, message) = decode_error_payload(&payload);
        assert_eq!(kind, ErrorPayloadKind::ServiceNotFound);
        assert_eq!(message, "no such service: foo");
    }

    #[test]
    fn legacy_payload_without_discriminator_falls_back() {
        let (kind, message) = decode_error_payload(b"Test error");
        assert_eq!(kind, ErrorPayloadKind::HandlerError);
        assert_eq!(message, "Test error");
    }

    #[test]
    fn display_names() {
        assert_eq!(ErrorPayloadKind::Overloaded.to_string(), "Overloaded");
        assert_eq!(ErrorPayloadKind::ReplyTimeout.to_string(), "ReplyTimeout");
    }
}
