//! The client dispatch engine: correlation-table based request/response
//! multiplexing, timeout tracking, back-pressure on send, and streaming
//! subscription lifecycle.
//!
//! Built against the contracts in `rrpc-core` (`Transport`, `RpcError`,
//! `EndpointResolver`, `IdleStrategy`) so it is fully testable against
//! `rrpc-transport-mem` without any real network or shared-memory substrate.

mod engine;
mod pending;
mod subscriber;

pub use engine::{BuildError, ClientEngine, ClientEngineBuilder};
pub use subscriber::StreamSubscriber;
