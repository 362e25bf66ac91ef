//! The stream sink contract a streaming handler is invoked with: `on_next`
//! may be called from any worker thread, but the sink
//! serializes emissions internally so wire order is preserved per-sink; once
//! a terminal (`on_complete`/`on_error`) has gone out, further calls are
//! silently dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rrpc_core::{IdleStrategy, Transport};
use rrpc_metrics::RpcMetrics;
use rrpc_wire::{encode_error_payload, ErrorPayloadKind, MessageType, RpcMessage};
use tokio::sync::Mutex as AsyncMutex;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait ServerStreamSink: Send + Sync + 'static {
    fn on_next(&self, payload: Bytes) -> BoxFuture<'_, ()>;
    fn on_error(&self, message: String) -> BoxFuture<'_, ()>;
    fn on_complete(&self) -> BoxFuture<'_, ()>;
}

/// The concrete sink emitted to streaming handlers: wraps one correlation
/// id's reply emission over a shared `Transport`.
pub struct ChannelStreamSink<T: Transport> {
    transport: T,
    request_id: u64,
    service_name: String,
    method_name: String,
    metrics: Arc<RpcMetrics>,
    idle: Arc<dyn IdleStrategy>,
    send_deadline: Duration,
    /// Guards both the terminated flag and emission order: checking
    /// `terminated` and flipping it for a terminal call happen under this
    /// same lock so a racing `on_next` can never observe a stale
    /// not-yet-terminated read between a terminal call's check and its set.
    state: AsyncMutex<bool>,
}

impl<T: Transport> ChannelStreamSink<T> {
    pub fn new(
        transport: T,
        request_id: u64,
        service_name: String,
        method_name: String,
        metrics: Arc<RpcMetrics>,
        idle: Arc<dyn IdleStrategy>,
        send_deadline: Duration,
    ) -> Self {
        Self {
            transport,
            request_id,
            service_name,
            method_name,
            metrics,
            idle,
            send_deadline,
            state: AsyncMutex::new(false),
        }
    }

    async fn emit(&self, message: RpcMessage) {
        let deadline = Instant::now() + self.send_deadline;
        let frame = message.encode().freeze();
        match rrpc_core::offer_until(&self.transport, frame, self.idle.as_ref(), deadline).await {
            Ok(()) => {}
            Err(_) => {
                tracing::warn!(
                    service = %self.service_name,
                    method = %self.method_name,
                    request_id = self.request_id,
                    "dropped reply: send-deadline exceeded under back-pressure"
                );
                self.metrics.record_dropped_reply(&self.service_name);
                // One best-effort final attempt; if this also fails there is
                // nothing further the sink can do without blocking forever.
                let error = RpcMessage {
                    request_id: self.request_id,
                    message_type: MessageType::Error,
                    flags: 0,
                    service_name: self.service_name.clone(),
                    method_name: self.method_name.clone(),
                    payload: encode_error_payload(ErrorPayloadKind::Overloaded, "reply dropped under back-pressure"),
                };
                let _ = self.transport.send_frame(error.encode().freeze()).await;
            }
        }
    }
}

impl<T: Transport> ServerStreamSink for ChannelStreamSink<T> {
    fn on_next(&self, payload: Bytes) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let terminated = self.state.lock().await;
            if *terminated {
                return;
            }
            let message = RpcMessage {
                request_id: self.request_id,
                message_type: MessageType::Response,
                flags: 0,
                service_name: self.service_name.clone(),
                method_name: self.method_name.clone(),
                payload,
            };
            self.emit(message).await;
        })
    }

    fn on_error(&self, message: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut terminated = self.state.lock().await;
            if *terminated {
                return;
            }
            *terminated = true;
            self.metrics.record_error(&self.service_name, false);
            let frame = RpcMessage {
                request_id: self.request_id,
                message_type: MessageType::Error,
                flags: 0,
                service_name: self.service_name.clone(),
                method_name: self.method_name.clone(),
                payload: encode_error_payload(ErrorPayloadKind::HandlerError, &message),
            };
            self.emit(frame).await;
        })
    }

    fn on_complete(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut terminated = self.state.lock().await;
            if *terminated {
                return;
            }
            *terminated = true;
            let frame = RpcMessage {
                request_id: self.request_id,
                message_type: MessageType::Complete,
                flags: 0,
                service_name: self.service_name.clone(),
                method_name: self.method_name.clone(),
                payload: Bytes::new(),
            };
            self.emit(frame).await;
        })
    }
}
