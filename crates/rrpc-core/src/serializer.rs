//! The `Serializer` contract: pluggable value serialization, consumed but
//! not implemented by the core (the one concrete implementation,
//! `rrpc-codec-json`, lives in its own crate to demonstrate the contract).

use serde::{de::DeserializeOwned, Serialize};

/// Serializes/deserializes RPC payloads.
///
/// Mirrors the teacher's `Codec` trait: a stateless type carrying the
/// encode/decode behavior as associated functions, selected at the type
/// level rather than via a trait object, so a client or server engine can be
/// monomorphized over its serializer with no dynamic dispatch on the hot
/// path.
pub trait Serializer: Send + Sync + 'static {
    /// MIME-ish content-type string exposed for logging/tooling, e.g.
    /// `"application/json"`.
    const CONTENT_TYPE: &'static str;

    type Error: std::error::Error + Send + Sync + 'static;

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, Self::Error>;

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Self::Error>;
}
