//! The in-process service registry: `name -> Handler`, where a `Handler` is
//! either unary (`payload -> Future<value>`) or streaming
//! (`(payload, StreamSink) -> ()`). Duplicate registration fails rather than
//! overwriting the previous handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::sink::ServerStreamSink;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unary handler: one payload in, one value or error message out.
///
/// Boxed-future return (rather than an `async fn` in the trait) so this
/// trait stays object-safe: handlers are stored as `Arc<dyn UnaryHandler>`
/// in the registry, the same shape `rrpc_core::Transport`'s sibling
/// `IdleStrategy` trait uses for the same reason.
pub trait UnaryHandler: Send + Sync + 'static {
    fn call(&self, payload: Bytes) -> BoxFuture<'_, Result<Bytes, String>>;
}

impl<F, Fut> UnaryHandler for F
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, String>> + Send + 'static,
{
    fn call(&self, payload: Bytes) -> BoxFuture<'_, Result<Bytes, String>> {
        Box::pin(self(payload))
    }
}

/// A server-streaming handler: the registry hands it a sink to emit
/// zero-or-more values through, followed by exactly one terminal call.
pub trait StreamingHandler: Send + Sync + 'static {
    fn call(&self, payload: Bytes, sink: Arc<dyn ServerStreamSink>) -> BoxFuture<'_, ()>;
}

impl<F, Fut> StreamingHandler for F
where
    F: Fn(Bytes, Arc<dyn ServerStreamSink>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, payload: Bytes, sink: Arc<dyn ServerStreamSink>) -> BoxFuture<'_, ()> {
        Box::pin(self(payload, sink))
    }
}

/// One registered handler, tagged by kind so the poll loop can validate the
/// wire `STREAMING` flag against the registration instead of only trusting
/// the flag.
#[derive(Clone)]
pub enum Handler {
    Unary(Arc<dyn UnaryHandler>),
    Streaming(Arc<dyn StreamingHandler>),
}

impl Handler {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Handler::Streaming(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateService;

impl std::fmt::Display for DuplicateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a handler is already registered for this service name")
    }
}

impl std::error::Error for DuplicateService {}

/// `name -> Handler`. Registration is expected to happen before the engine
/// starts polling; lookups happen on every inbound frame, so reads go
/// through a `RwLock` rather than a `Mutex`.
#[derive(Default)]
pub struct ServiceRegistry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, handler: Handler) -> Result<(), DuplicateService> {
        let name = name.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&name) {
            return Err(DuplicateService);
        }
        tracing::info!(service = %name, streaming = handler.is_streaming(), "service registered");
        handlers.insert(name, handler);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Handler> {
        self.handlers.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_lookup_unary() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                "echo",
                Handler::Unary(Arc::new(|payload: Bytes| async move { Ok(payload) })),
            )
            .unwrap();

        match registry.lookup("echo") {
            Some(Handler::Unary(handler)) => {
                let result = handler.call(Bytes::from_static(b"hi")).await.unwrap();
                assert_eq!(&result[..], b"hi");
            }
            _ => panic!("expected a unary handler"),
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = ServiceRegistry::new();
        registry
            .register("echo", Handler::Unary(Arc::new(|p: Bytes| async move { Ok(p) })))
            .unwrap();
        let result = registry.register("echo", Handler::Unary(Arc::new(|p: Bytes| async move { Ok(p) })));
        assert_eq!(result, Err(DuplicateService));
    }

    #[test]
    fn unknown_service_lookup_is_none() {
        let registry = ServiceRegistry::new();
        assert!(registry.lookup("missing").is_none());
    }
}
