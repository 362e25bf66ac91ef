//! The `Transport` contract: a Publication/Subscription-shaped external
//! collaborator, narrowed to the shape the client and server engines
//! actually drive.
//!
//! A non-blocking `offer` (which may report back-pressure) on the send side
//! paired with a `poll(handler, fragment_limit)` subscription side, with
//! the substrate performing fragment reassembly. Fragment reassembly is
//! owned by the underlying messaging substrate, so engines
//! here deal in whole frames: `send_frame` is the async analogue of
//! offer-until-accepted, and `recv_frame` is the analogue of polling for one
//! reassembled fragment.

use std::fmt;

use bytes::Bytes;

/// Error surfaced by a `Transport` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The publication or subscription has been closed.
    Closed,
    /// The send side is back-pressured; the caller should retry after
    /// idling. Distinguished from `Closed` so callers can apply their own
    /// deadline/idle-strategy loop around it (see `rrpc-client`'s send path).
    BackPressure,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::BackPressure => write!(f, "transport back-pressured"),
        }
    }
}

impl std::error::Error for TransportError {}

/// A publication/subscription pair for a `(channel, stream-id)` tuple.
///
/// Implementations are expected to be cheap to clone (an `Arc` around shared
/// state), matching the teacher's `MemTransport`/`TransportBackend` split:
/// many callers may hold a clone and call `send_frame` concurrently, while
/// exactly one task polls `recv_frame` at a time per direction.
pub trait Transport: Send + Sync + Clone + 'static {
    /// Attempt to send one already-encoded frame. Implementations that model
    /// back-pressure return `Err(TransportError::BackPressure)` instead of
    /// blocking; the caller's idle strategy decides how to retry.
    fn send_frame(&self, frame: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next frame, or block (per the implementation's idle
    /// strategy) until one arrives or the transport closes.
    fn recv_frame(&self) -> impl Future<Output = Result<Bytes, TransportError>> + Send;

    /// Close this side of the transport. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
