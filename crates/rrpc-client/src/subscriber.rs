//! The stream sink contract exposed to a `stream()` caller. A
//! `StreamSubscriber` receives zero-or-more values followed by exactly one
//! terminal signal, in wire order.

use bytes::Bytes;
use rrpc_core::RpcError;

/// Receives the values and terminal signal of one streaming call.
///
/// `on_next` is delivered in wire order for a given call and never after
/// `on_complete`/`on_error`. `request` and `cancel` are the core's no-op
/// stand-ins for advisory flow-control/cancellation hooks: overriding them
/// only affects local delivery, never the wire — cancellation never
/// propagates to the server.
pub trait StreamSubscriber: Send + Sync + 'static {
    fn on_next(&self, payload: Bytes);
    fn on_error(&self, error: RpcError);
    fn on_complete(&self);

    /// Advisory demand signal. No-op in the core: the client does not
    /// implement reactive-pull flow control over the wire.
    fn request(&self, _n: u64) {}

    /// Advisory local cancellation: a correctly-behaved implementation
    /// should stop acting on further `on_next` calls after this, but the
    /// core keeps delivering (and the server keeps emitting) until the
    /// terminal signal or the call's deadline.
    fn cancel(&self) {}
}
