//! Shared back-pressure retry loop around [`Transport::send_frame`].
//!
//! Both the client's send path and the server's reply emission describe the
//! same shape: offer a frame to the transport, and on back-pressure
//! idle-and-retry with the configured idle strategy until either the offer
//! is accepted or a deadline passes. This is that loop, written once.

use std::time::Instant;

use bytes::Bytes;

use crate::idle::IdleStrategy;
use crate::transport::{Transport, TransportError};

/// Offer `frame` to `transport`, idling and retrying on back-pressure until
/// either it is accepted or `deadline` passes.
///
/// Returns `Err(TransportError::BackPressure)` if the deadline elapses while
/// still back-pressured (the caller maps this to `SendTimeout` or a dropped
/// reply, depending on which side it's called from), or
/// `Err(TransportError::Closed)` if the transport closes mid-retry.
pub async fn offer_until<T: Transport>(
    transport: &T,
    frame: Bytes,
    idle: &dyn IdleStrategy,
    deadline: Instant,
) -> Result<(), TransportError> {
    let mut attempt = 0u32;
    loop {
        match transport.send_frame(frame.clone()).await {
            Ok(()) => {
                idle.reset();
                return Ok(());
            }
            Err(TransportError::Closed) => return Err(TransportError::Closed),
            Err(TransportError::BackPressure) => {
                if Instant::now() > deadline {
                    return Err(TransportError::BackPressure);
                }
                idle.idle(attempt).await;
                attempt += 1;
            }
        }
    }
}
