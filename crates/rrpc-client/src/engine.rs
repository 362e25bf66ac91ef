//! The client dispatch engine: send path, reply-poll loop, timeout reaper,
//! and graceful shutdown.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use rrpc_balancer::{Balancer, SelectStrategy};
use rrpc_core::{
    BackoffIdle, EndpointResolver, IdleStrategy, RpcError, ServiceEndpoint, Transport,
    TransportError,
};
use rrpc_limiter::TokenBucket;
use rrpc_metrics::RpcMetrics;
use rrpc_wire::{decode_error_payload, ErrorPayloadKind, MessageType, RpcMessage, FLAG_STREAMING};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::pending::{Completion, PendingRequest, PendingTable};
use crate::subscriber::StreamSubscriber;

const STATE_RUNNING: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Builder for a [`ClientEngine`]. `build()` validates inputs and starts
/// the poll/reaper tasks rather than leaving construction and startup as
/// separate steps the caller could forget to sequence.
pub struct ClientEngineBuilder<T: Transport> {
    transport: Option<T>,
    resolver: Option<Arc<dyn EndpointResolver>>,
    balancer: Balancer,
    rate_limiter: Option<Arc<TokenBucket>>,
    timeout: Duration,
    idle: Arc<dyn IdleStrategy>,
    metrics: Arc<RpcMetrics>,
    reaper_interval: Option<Duration>,
}

/// Error returned by [`ClientEngineBuilder::build`] when a required field
/// is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    MissingTransport,
    MissingResolver,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::MissingTransport => write!(f, "client engine requires a transport"),
            BuildError::MissingResolver => write!(f, "client engine requires an endpoint resolver"),
        }
    }
}

impl std::error::Error for BuildError {}

impl<T: Transport> Default for ClientEngineBuilder<T> {
    fn default() -> Self {
        Self {
            transport: None,
            resolver: None,
            balancer: Balancer::default(),
            rate_limiter: None,
            timeout: Duration::from_secs(5),
            idle: Arc::new(BackoffIdle::default()),
            metrics: Arc::new(RpcMetrics::new()),
            reaper_interval: None,
        }
    }
}

impl<T: Transport> ClientEngineBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn EndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn balancer(mut self, balancer: Balancer) -> Self {
        self.balancer = balancer;
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Per-call deadline. Also seeds the reaper's default fixed-rate
    /// interval when `reaper_interval` is left unset.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn idle_strategy(mut self, idle: Arc<dyn IdleStrategy>) -> Self {
        self.idle = idle;
        self
    }

    pub fn metrics(mut self, metrics: Arc<RpcMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = Some(interval);
        self
    }

    /// Validate and start the engine: spawns the reply-poll task and the
    /// timeout reaper.
    pub fn build(self) -> Result<ClientEngine<T>, BuildError> {
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let resolver = self.resolver.ok_or(BuildError::MissingResolver)?;
        let reaper_interval = self.reaper_interval.unwrap_or(self.timeout);

        let inner = Arc::new(Inner {
            transport,
            resolver,
            balancer: self.balancer,
            rate_limiter: self.rate_limiter,
            timeout: self.timeout,
            idle: self.idle,
            metrics: self.metrics,
            next_id: AtomicU64::new(1),
            pending: PendingTable::new(),
            state: AtomicU8::new(STATE_RUNNING),
        });

        let poll_task = tokio::spawn(poll_loop(inner.clone()));
        let reaper_task = tokio::spawn(reaper_loop(inner.clone(), reaper_interval));

        Ok(ClientEngine {
            inner,
            poll_task: Some(poll_task),
            reaper_task: Some(reaper_task),
        })
    }
}

struct Inner<T: Transport> {
    transport: T,
    resolver: Arc<dyn EndpointResolver>,
    balancer: Balancer,
    rate_limiter: Option<Arc<TokenBucket>>,
    timeout: Duration,
    idle: Arc<dyn IdleStrategy>,
    metrics: Arc<RpcMetrics>,
    next_id: AtomicU64,
    pending: PendingTable,
    state: AtomicU8,
}

/// A running client engine. Exclusively owns its transport handle, reply-
/// poll task, reaper task, and pending-request table. Cheap to clone:
/// clones share the same `Inner` and all observe the same pending table
/// and tasks.
pub struct ClientEngine<T: Transport> {
    inner: Arc<Inner<T>>,
    poll_task: Option<JoinHandle<()>>,
    reaper_task: Option<JoinHandle<()>>,
}

impl<T: Transport> Clone for ClientEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            poll_task: None,
            reaper_task: None,
        }
    }
}

impl<T: Transport> ClientEngine<T> {
    pub fn metrics(&self) -> &RpcMetrics {
        &self.inner.metrics
    }

    fn resolve_endpoint(&self, service: &str) -> Result<ServiceEndpoint, RpcError> {
        let endpoints = self.inner.resolver.find_endpoints(service);
        if endpoints.is_empty() {
            return Err(RpcError::NoEndpoints {
                service: service.to_string(),
            });
        }
        // Selection is recorded for fairness bookkeeping (SWRR state,
        // LeastConnections counters); the frame itself always goes out over
        // this engine's single configured transport. Routing frames to a
        // distinct physical connection per endpoint is left to the
        // messaging substrate underneath this core.
        self.inner
            .balancer
            .select(service, &endpoints)
            .ok_or_else(|| RpcError::NoEndpoints {
                service: service.to_string(),
            })
    }

    /// Unary call: `call("echo", "_", bytes)`.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes, RpcError> {
        if self.inner.state.load(Ordering::Acquire) != STATE_RUNNING {
            return Err(RpcError::Cancelled);
        }

        if let Some(limiter) = &self.inner.rate_limiter {
            if !limiter.try_acquire_one().is_granted() {
                return Err(RpcError::RateLimited {
                    service: service.to_string(),
                });
            }
        }

        let endpoint = self.resolve_endpoint(service)?;
        self.inner.balancer.increment_in_flight(&endpoint.id);

        let (tx, rx) = oneshot::channel();
        let send_result = self.send_request(
            service,
            method,
            payload,
            false,
            Completion::Unary(tx),
        ).await;
        let correlation_id = match send_result {
            Ok(id) => id,
            Err(err) => {
                self.inner.balancer.decrement_in_flight(&endpoint.id);
                return Err(err);
            }
        };

        let result = match rx.await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Cancelled),
        };
        self.inner.balancer.decrement_in_flight(&endpoint.id);

        if result.is_err() {
            // Entries that fail via the reply-poll task or reaper already
            // recorded metrics at the point of completion; nothing further
            // to do here. We still remove defensively in case completion
            // happened without going through those paths.
            self.inner.pending.remove(correlation_id);
        }
        result
    }

    /// Server-streaming call: values arrive via `subscriber.on_next` until
    /// exactly one of `on_complete`/`on_error` fires.
    pub async fn stream(
        &self,
        service: &str,
        method: &str,
        payload: Bytes,
        subscriber: Arc<dyn StreamSubscriber>,
    ) -> Result<(), RpcError> {
        if self.inner.state.load(Ordering::Acquire) != STATE_RUNNING {
            return Err(RpcError::Cancelled);
        }

        if let Some(limiter) = &self.inner.rate_limiter {
            if !limiter.try_acquire_one().is_granted() {
                return Err(RpcError::RateLimited {
                    service: service.to_string(),
                });
            }
        }

        self.resolve_endpoint(service)?;
        self.send_request(
            service,
            method,
            payload,
            true,
            Completion::Streaming(subscriber),
        ).await?;
        Ok(())
    }

    /// Assign a correlation id, insert the pending entry, encode the frame,
    /// and offer it to the transport, retrying through back-pressure until
    /// the deadline. On any failure the entry is removed
    /// before returning so the table never accumulates a send that never
    /// went out.
    async fn send_request(
        &self,
        service: &str,
        method: &str,
        payload: Bytes,
        streaming: bool,
        completion: Completion,
    ) -> Result<u64, RpcError> {
        let correlation_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let deadline = now + self.inner.timeout;

        self.inner
            .pending
            .insert(
                correlation_id,
                PendingRequest {
                    service: service.to_string(),
                    method: method.to_string(),
                    deadline,
                    created_at: now,
                    completion,
                },
            )
            .expect("correlation ids are monotonic and non-wrapping within a session");

        let message = RpcMessage {
            request_id: correlation_id,
            message_type: MessageType::Request,
            flags: if streaming { FLAG_STREAMING } else { 0 },
            service_name: service.to_string(),
            method_name: method.to_string(),
            payload,
        };
        let mut scratch = BytesMut::with_capacity(message.encoded_len());
        message.encode_into(&mut scratch);

        match rrpc_core::offer_until(&self.inner.transport, scratch.freeze(), self.inner.idle.as_ref(), deadline).await {
            Ok(()) => Ok(correlation_id),
            Err(TransportError::BackPressure) => {
                self.inner.pending.remove(correlation_id);
                tracing::warn!(service, method, correlation_id, "send timed out under back-pressure");
                Err(RpcError::SendTimeout {
                    service: service.to_string(),
                    method: method.to_string(),
                })
            }
            Err(TransportError::Closed) => {
                self.inner.pending.remove(correlation_id);
                Err(RpcError::Cancelled)
            }
        }
    }

    /// Transition to `CLOSING`, stop the poll and reaper tasks, cancel every
    /// still-pending entry, and close the transport. Idempotent: a second
    /// call observes the engine already closing/closed
    /// and returns immediately.
    pub async fn close(&mut self) {
        if self
            .inner
            .state
            .compare_exchange(STATE_RUNNING, STATE_CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(task) = self.reaper_task.take() {
            task.abort();
        }

        for (_, request) in self.inner.pending.drain() {
            complete_with(request, Err(RpcError::Cancelled));
        }

        self.inner.transport.close();
        self.inner.state.store(STATE_CLOSED, Ordering::Release);
        tracing::info!("client engine closed");
    }
}

/// Complete a pending entry with a terminal unary result, or route it to
/// the appropriate streaming callback. `Ok` is only meaningful for unary
/// entries; streaming entries only ever complete via `Err` here (the
/// reaper and shutdown only ever produce terminal errors, never values).
fn complete_with(request: PendingRequest, result: Result<Bytes, RpcError>) {
    match request.completion {
        Completion::Unary(tx) => {
            let _ = tx.send(result);
        }
        Completion::Streaming(sink) => match result {
            Ok(_) => unreachable!("streaming entries never complete with a bare value"),
            Err(err) => sink.on_error(err),
        },
    }
}

async fn poll_loop<T: Transport>(inner: Arc<Inner<T>>) {
    loop {
        if inner.state.load(Ordering::Acquire) != STATE_RUNNING {
            return;
        }
        match inner.transport.recv_frame().await {
            Ok(bytes) => handle_frame(&inner, &bytes),
            Err(TransportError::Closed) => return,
            Err(TransportError::BackPressure) => unreachable!("recv_frame never reports back-pressure"),
        }
    }
}

fn handle_frame<T: Transport>(inner: &Inner<T>, bytes: &[u8]) {
    let message = match RpcMessage::decode(bytes) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(%err, "client dropped malformed reply frame");
            return;
        }
    };

    match message.message_type {
        MessageType::Response => {
            let Some(request) = inner.pending.remove(message.request_id) else {
                if let Some(sink) = inner.pending.streaming_subscriber(message.request_id) {
                    sink.on_next(message.payload);
                }
                return;
            };
            // Removed a unary entry that turned out to carry a streaming
            // response: re-deliver as on_next and re-insert, since the
            // streaming entry must stay in the table until its terminal.
            match request.completion {
                Completion::Unary(tx) => {
                    inner.metrics.record_response(
                        &request.service,
                        message.payload.len() as u64,
                        request.created_at.elapsed(),
                    );
                    let _ = tx.send(Ok(message.payload));
                }
                Completion::Streaming(sink) => {
                    sink.on_next(message.payload);
                    let service = request.service.clone();
                    let method = request.method.clone();
                    let deadline = request.deadline;
                    let created_at = request.created_at;
                    let _ = inner.pending.insert(
                        message.request_id,
                        PendingRequest {
                            service,
                            method,
                            deadline,
                            created_at,
                            completion: Completion::Streaming(sink),
                        },
                    );
                }
            }
        }
        MessageType::Error => {
            let Some(request) = inner.pending.remove(message.request_id) else {
                return;
            };
            let (kind, text) = decode_error_payload(&message.payload);
            let error = map_error_payload(&request.service, kind, text);
            inner.metrics.record_error(&request.service, false);
            complete_with(request, Err(error));
        }
        MessageType::Complete => {
            let Some(request) = inner.pending.remove(message.request_id) else {
                return;
            };
            match request.completion {
                Completion::Streaming(sink) => sink.on_complete(),
                Completion::Unary(tx) => {
                    tracing::warn!(
                        correlation_id = message.request_id,
                        "received COMPLETE for a unary call"
                    );
                    let _ = tx.send(Err(RpcError::Cancelled));
                }
            }
        }
        MessageType::Request => {
            tracing::warn!(correlation_id = message.request_id, "client received a REQUEST frame on its reply subscription");
        }
    }
}

fn map_error_payload(service: &str, kind: ErrorPayloadKind, text: String) -> RpcError {
    match kind {
        ErrorPayloadKind::ServiceNotFound => RpcError::ServiceNotFound { service: service.to_string() },
        ErrorPayloadKind::HandlerError => RpcError::HandlerError { message: text },
        ErrorPayloadKind::Overloaded => RpcError::Overloaded,
        ErrorPayloadKind::ReplyTimeout => RpcError::ReplyTimeout {
            service: service.to_string(),
            method: String::new(),
        },
        ErrorPayloadKind::SerializationError => RpcError::SerializationError { message: text },
    }
}

async fn reaper_loop<T: Transport>(inner: Arc<Inner<T>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if inner.state.load(Ordering::Acquire) != STATE_RUNNING {
            return;
        }
        let expired = inner.pending.sweep_expired(Instant::now());
        for (correlation_id, request) in expired {
            tracing::warn!(
                service = %request.service,
                method = %request.method,
                correlation_id,
                "reply timed out"
            );
            inner.metrics.record_error(&request.service, true);
            let service = request.service.clone();
            let method = request.method.clone();
            complete_with(
                request,
                Err(RpcError::ReplyTimeout { service, method }),
            );
        }
    }
}
