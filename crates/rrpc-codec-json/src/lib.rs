//! A `Serializer` implementation over `serde_json`.
//!
//! Trade-offs versus a binary format: larger messages, slower encode/decode,
//! but human-readable on the wire — useful for debugging and for
//! interoperating with non-Rust tooling.

use rrpc_core::Serializer;
use serde::{de::DeserializeOwned, Serialize};

pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    const CONTENT_TYPE: &'static str = "application/json";

    type Error = serde_json::Error;

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(value)
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(bytes)
    }
}
