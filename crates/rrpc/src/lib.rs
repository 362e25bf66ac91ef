//! Facade crate for the RPC transport and dispatch core.
//!
//! This crate does not add behavior of its own: it re-exports the pieces
//! assembled by `rrpc-wire`, `rrpc-core`, `rrpc-limiter`, `rrpc-balancer`,
//! `rrpc-metrics`, `rrpc-client`, and `rrpc-server` under one name, so a
//! caller who just wants "client and server engines" doesn't need to depend
//! on eight crates directly. Pick a `Transport` and a value encoding,
//! register handlers on a [`ServerEngineBuilder`], and drive calls through a
//! [`ClientEngineBuilder`]-built [`ClientEngine`].
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use rrpc::{ClientEngineBuilder, ServerEngineBuilder, ServiceEndpoint, StaticResolver};
//! use rrpc::MemTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (server_side, client_side) = MemTransport::pair();
//!
//! let server = ServerEngineBuilder::new()
//!     .transport(server_side)
//!     .register_unary("echo", |payload: Bytes| async move { Ok(payload) })
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! server.start();
//!
//! let resolver = Arc::new(
//!     StaticResolver::new()
//!         .with_service("echo", vec![ServiceEndpoint::new("local", "localhost", 0, 1)]),
//! );
//! let client = ClientEngineBuilder::new()
//!     .transport(client_side)
//!     .resolver(resolver)
//!     .timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! let reply = client.call("echo", "_", Bytes::from_static(b"hi")).await.unwrap();
//! assert_eq!(&reply[..], b"hi");
//! # }
//! ```

pub use rrpc_balancer::{
    Balancer, LeastConnections, Random, RoundRobin, SelectStrategy, Swrr, WeightedRandom,
};
pub use rrpc_client::{BuildError as ClientBuildError, ClientEngine, ClientEngineBuilder, StreamSubscriber};
pub use rrpc_core::{
    BackoffIdle, BusySpinIdle, DecodeError, EndpointResolver, IdleStrategy, MessageType, RpcError,
    RpcMessage, ServiceEndpoint, StaticResolver, Transport, TransportError, Version, YieldingIdle,
};
pub use rrpc_limiter::{Admission, InvalidRate, TokenBucket};
pub use rrpc_metrics::{MetricsSnapshot, RpcMetrics};
pub use rrpc_server::{
    BuildError as ServerBuildError, DuplicateService, ServerEngine, ServerEngineBuilder,
    ServerStreamSink, StreamingHandler, UnaryHandler,
};
pub use rrpc_wire::{decode_error_payload, encode_error_payload, ErrorPayloadKind, FLAG_STREAMING};

#[cfg(feature = "mem")]
pub use rrpc_transport_mem::MemTransport;

#[cfg(feature = "json")]
pub use rrpc_codec_json::JsonSerializer;

pub use rrpc_core::Serializer;
