//! The server dispatch engine: poll loop, fragment reassembly
//! hand-off (delegated to the `Transport`'s whole-frame contract — see
//! `rrpc-core::Transport`'s doc comment), per-request worker offloading,
//! and reply/error/stream-terminator emission.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use rrpc_core::{BackoffIdle, IdleStrategy, Transport, TransportError};
use rrpc_metrics::RpcMetrics;
use rrpc_wire::{encode_error_payload, ErrorPayloadKind, MessageType, RpcMessage};
use tokio::task::JoinHandle;

use crate::registry::{DuplicateService, Handler, ServiceRegistry, StreamingHandler, UnaryHandler};
use crate::sink::ChannelStreamSink;
use crate::worker::WorkerPool;

const STATE_NEW: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_CLOSING: u8 = 3;
const STATE_CLOSED: u8 = 4;

pub struct ServerEngineBuilder<T: Transport> {
    transport: Option<T>,
    registry: ServiceRegistry,
    metrics: Arc<RpcMetrics>,
    idle: Arc<dyn IdleStrategy>,
    worker_max: usize,
    queue_capacity: usize,
    send_deadline: Duration,
    shutdown_grace: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    MissingTransport,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::MissingTransport => write!(f, "server engine requires a transport"),
        }
    }
}

impl std::error::Error for BuildError {}

impl<T: Transport> Default for ServerEngineBuilder<T> {
    fn default() -> Self {
        Self {
            transport: None,
            registry: ServiceRegistry::new(),
            metrics: Arc::new(RpcMetrics::new()),
            idle: Arc::new(BackoffIdle::default()),
            worker_max: 16,
            queue_capacity: 256,
            send_deadline: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl<T: Transport> ServerEngineBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn metrics(mut self, metrics: Arc<RpcMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn idle_strategy(mut self, idle: Arc<dyn IdleStrategy>) -> Self {
        self.idle = idle;
        self
    }

    /// `max` worker tasks, each draining a queue of depth `queue_capacity`.
    pub fn worker_pool(mut self, max: usize, queue_capacity: usize) -> Self {
        self.worker_max = max;
        self.queue_capacity = queue_capacity;
        self
    }

    /// Deadline a reply emission gets before the sink gives up and records
    /// a dropped reply.
    pub fn send_deadline(mut self, deadline: Duration) -> Self {
        self.send_deadline = deadline;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn register_unary(self, name: impl Into<String>, handler: impl UnaryHandler) -> Result<Self, DuplicateService> {
        self.registry.register(name, Handler::Unary(Arc::new(handler)))?;
        Ok(self)
    }

    pub fn register_streaming(
        self,
        name: impl Into<String>,
        handler: impl StreamingHandler,
    ) -> Result<Self, DuplicateService> {
        self.registry.register(name, Handler::Streaming(Arc::new(handler)))?;
        Ok(self)
    }

    pub fn build(self) -> Result<ServerEngine<T>, BuildError> {
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        Ok(ServerEngine {
            inner: Arc::new(Inner {
                transport,
                registry: self.registry,
                metrics: self.metrics,
                idle: self.idle,
                worker_max: self.worker_max,
                queue_capacity: self.queue_capacity,
                send_deadline: self.send_deadline,
                shutdown_grace: self.shutdown_grace,
                state: AtomicU8::new(STATE_NEW),
                worker_pool: Mutex::new(None),
            }),
            poll_task: Mutex::new(None),
        })
    }
}

struct Inner<T: Transport> {
    transport: T,
    registry: ServiceRegistry,
    metrics: Arc<RpcMetrics>,
    idle: Arc<dyn IdleStrategy>,
    worker_max: usize,
    queue_capacity: usize,
    send_deadline: Duration,
    shutdown_grace: Duration,
    state: AtomicU8,
    worker_pool: Mutex<Option<WorkerPool>>,
}

/// `NEW -> STARTING -> RUNNING -> CLOSING -> CLOSED`. `start` and `close`
/// are idempotent: calling either again once it has already taken effect is
/// a no-op rather than an error.
pub struct ServerEngine<T: Transport> {
    inner: Arc<Inner<T>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> ServerEngine<T> {
    pub fn metrics(&self) -> &RpcMetrics {
        &self.inner.metrics
    }

    /// Begin polling the request subscription. A second call while already
    /// running (or past running) is a no-op.
    pub fn start(&self) {
        if self
            .inner
            .state
            .compare_exchange(STATE_NEW, STATE_STARTING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let pool = WorkerPool::new("rrpc-server", self.inner.worker_max, self.inner.queue_capacity);
        *self.inner.worker_pool.lock() = Some(pool);

        self.inner.state.store(STATE_RUNNING, Ordering::Release);
        tracing::info!("server engine started");

        let inner = self.inner.clone();
        let task = tokio::spawn(poll_loop(inner));
        *self.poll_task.lock() = Some(task);
    }

    /// Transition to `CLOSING`, stop accepting new frames, let in-flight
    /// worker jobs drain (bounded by `shutdown_grace`), then close the
    /// transport and transition to `CLOSED`.
    pub async fn close(&self) {
        let prior = self.inner.state.swap(STATE_CLOSING, Ordering::AcqRel);
        if prior == STATE_CLOSING || prior == STATE_CLOSED {
            self.inner.state.store(prior, Ordering::Release);
            return;
        }

        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }

        if let Some(pool) = self.inner.worker_pool.lock().take() {
            pool.shutdown(self.inner.shutdown_grace).await;
        }

        self.inner.transport.close();
        self.inner.state.store(STATE_CLOSED, Ordering::Release);
        tracing::info!("server engine closed");
    }
}

async fn poll_loop<T: Transport>(inner: Arc<Inner<T>>) {
    loop {
        if inner.state.load(Ordering::Acquire) != STATE_RUNNING {
            return;
        }
        match inner.transport.recv_frame().await {
            Ok(bytes) => dispatch_frame(&inner, &bytes),
            Err(TransportError::Closed) => return,
            Err(TransportError::BackPressure) => unreachable!("recv_frame never reports back-pressure"),
        }
    }
}

fn dispatch_frame<T: Transport>(inner: &Arc<Inner<T>>, bytes: &[u8]) {
    let message = match RpcMessage::decode(bytes) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(%err, "server dropped malformed request frame");
            return;
        }
    };

    if message.message_type != MessageType::Request {
        tracing::warn!(correlation_id = message.request_id, "server received a non-REQUEST frame");
        return;
    }

    inner.metrics.record_request(&message.service_name);

    let Some(handler) = inner.registry.lookup(&message.service_name) else {
        let text = format!("ServiceNotFound: {}", message.service_name);
        tracing::warn!(service = %message.service_name, "no handler registered for service");
        inner.metrics.record_error(&message.service_name, false);
        spawn_reply_error(inner.clone(), &message, ErrorPayloadKind::ServiceNotFound, text);
        return;
    };

    if handler.is_streaming() != message.is_streaming() {
        let text = format!(
            "ServiceNotFound: '{}' is registered as {} but the request was {}",
            message.service_name,
            if handler.is_streaming() { "streaming" } else { "unary" },
            if message.is_streaming() { "streaming" } else { "unary" },
        );
        tracing::warn!(service = %message.service_name, "request kind does not match registered handler kind");
        inner.metrics.record_error(&message.service_name, false);
        spawn_reply_error(inner.clone(), &message, ErrorPayloadKind::ServiceNotFound, text);
        return;
    }

    let job = build_job(inner.clone(), handler, message.clone());
    let pool = inner.worker_pool.lock();
    let accepted = pool.as_ref().is_some_and(|pool| pool.submit(job));
    drop(pool);

    if !accepted {
        tracing::warn!(service = %message.service_name, "worker queue saturated, replying Overloaded");
        inner.metrics.record_error(&message.service_name, false);
        spawn_reply_error(inner.clone(), &message, ErrorPayloadKind::Overloaded, "Overloaded".to_string());
    }
}

fn build_job<T: Transport>(
    inner: Arc<Inner<T>>,
    handler: Handler,
    message: RpcMessage,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        match handler {
            Handler::Unary(handler) => {
                let start = Instant::now();
                let result = handler.call(message.payload).await;
                match result {
                    Ok(value) => {
                        inner.metrics.record_response(&message.service_name, value.len() as u64, start.elapsed());
                        let response = RpcMessage {
                            request_id: message.request_id,
                            message_type: MessageType::Response,
                            flags: 0,
                            service_name: message.service_name,
                            method_name: message.method_name,
                            payload: value,
                        };
                        emit(&inner, response).await;
                    }
                    Err(error_message) => {
                        inner.metrics.record_error(&message.service_name, false);
                        let response = RpcMessage {
                            request_id: message.request_id,
                            message_type: MessageType::Error,
                            flags: 0,
                            service_name: message.service_name,
                            method_name: message.method_name,
                            payload: encode_error_payload(ErrorPayloadKind::HandlerError, &error_message),
                        };
                        emit(&inner, response).await;
                    }
                }
            }
            Handler::Streaming(handler) => {
                let sink = Arc::new(ChannelStreamSink::new(
                    inner.transport.clone(),
                    message.request_id,
                    message.service_name.clone(),
                    message.method_name.clone(),
                    inner.metrics.clone(),
                    inner.idle.clone(),
                    inner.send_deadline,
                ));
                handler.call(message.payload, sink).await;
            }
        }
    })
}

async fn emit<T: Transport>(inner: &Arc<Inner<T>>, message: RpcMessage) {
    let deadline = Instant::now() + inner.send_deadline;
    let frame = message.encode().freeze();
    if rrpc_core::offer_until(&inner.transport, frame, inner.idle.as_ref(), deadline).await.is_err() {
        tracing::warn!(
            service = %message.service_name,
            correlation_id = message.request_id,
            "dropped reply: send-deadline exceeded under back-pressure"
        );
        inner.metrics.record_dropped_reply(&message.service_name);
        let error = RpcMessage {
            request_id: message.request_id,
            message_type: MessageType::Error,
            flags: 0,
            service_name: message.service_name,
            method_name: message.method_name,
            payload: encode_error_payload(ErrorPayloadKind::Overloaded, "reply dropped under back-pressure"),
        };
        let _ = inner.transport.send_frame(error.encode().freeze()).await;
    }
}

fn spawn_reply_error<T: Transport>(
    inner: Arc<Inner<T>>,
    request: &RpcMessage,
    kind: ErrorPayloadKind,
    text: String,
) {
    let frame = RpcMessage {
        request_id: request.request_id,
        message_type: MessageType::Error,
        flags: 0,
        service_name: request.service_name.clone(),
        method_name: request.method_name.clone(),
        payload: encode_error_payload(kind, &text),
    };
    tokio::spawn(async move {
        emit(&inner, frame).await;
    });
}
