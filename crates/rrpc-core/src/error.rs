use std::fmt;

use rrpc_wire::DecodeError;

use crate::transport::TransportError;

/// The error taxonomy a caller can observe from a unary call, or that a
/// streaming subscriber can observe via `on_error`.
///
/// Every variant here is a distinct failure mode; we never collapse them
/// into a single "RpcError(String)" so that callers can match on kind
/// rather than parse a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The endpoint resolver returned an empty set for `service`.
    NoEndpoints { service: String },
    /// The deadline elapsed while attempting to offer the request frame.
    SendTimeout { service: String, method: String },
    /// The deadline elapsed awaiting a reply.
    ReplyTimeout { service: String, method: String },
    /// The client's rate limiter denied the request.
    RateLimited { service: String },
    /// The server had no handler registered for `service`.
    ServiceNotFound { service: String },
    /// The user handler returned an error; `message` is forwarded verbatim.
    HandlerError { message: String },
    /// The server's worker queue was saturated.
    Overloaded,
    /// The decoder rejected a frame as malformed.
    MalformedFrame { reason: String },
    /// Payload encode or decode failed.
    SerializationError { message: String },
    /// The client closed with this entry still pending.
    Cancelled,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::NoEndpoints { service } => {
                write!(f, "no endpoints available for service '{service}'")
            }
            RpcError::SendTimeout { service, method } => {
                write!(f, "timed out sending {service}/{method}: back-pressure did not clear before the deadline")
            }
            RpcError::ReplyTimeout { service, method } => {
                write!(f, "timed out awaiting reply for {service}/{method}")
            }
            RpcError::RateLimited { service } => {
                write!(f, "request to '{service}' denied by rate limiter")
            }
            RpcError::ServiceNotFound { service } => {
                write!(f, "ServiceNotFound: {service}")
            }
            RpcError::HandlerError { message } => write!(f, "{message}"),
            RpcError::Overloaded => write!(f, "Overloaded"),
            RpcError::MalformedFrame { reason } => write!(f, "malformed frame: {reason}"),
            RpcError::SerializationError { message } => {
                write!(f, "serialization error: {message}")
            }
            RpcError::Cancelled => write!(f, "request cancelled"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<DecodeError> for RpcError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::MalformedFrame(reason) => RpcError::MalformedFrame {
                reason: reason.to_string(),
            },
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(_: TransportError) -> Self {
        RpcError::Cancelled
    }
}
