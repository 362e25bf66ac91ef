//! Shared vocabulary for the RPC transport and dispatch core.
//!
//! This crate has no opinion on how requests get dispatched; it only defines
//! the contracts the client and server engines are built against: the error
//! taxonomy, the `Transport` (Publication/Subscription) contract, the
//! `Serializer` contract, `ServiceEndpoint`, and `IdleStrategy`.

mod endpoint;
mod error;
mod idle;
mod offer;
mod resolver;
mod serializer;
mod transport;

pub use endpoint::{ServiceEndpoint, Version};
pub use error::RpcError;
pub use idle::{BackoffIdle, BusySpinIdle, IdleStrategy, YieldingIdle};
pub use offer::offer_until;
pub use resolver::{EndpointResolver, StaticResolver};
pub use serializer::Serializer;
pub use transport::{Transport, TransportError};

pub use rrpc_wire::{DecodeError, MessageType, RpcMessage};
