//! Integration tests for the client engine's send/receive contract,
//! written against a hand-rolled peer driving `rrpc-transport-mem`
//! directly (no server engine involved — that gets its own integration
//! tests in `rrpc-server`, and the two meet in `rrpc`'s end-to-end tests).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rrpc_client::{ClientEngineBuilder, StreamSubscriber};
use rrpc_core::{RpcError, StaticResolver};
use rrpc_transport_mem::MemTransport;
use rrpc_wire::{MessageType, RpcMessage};

fn resolver() -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::new().with_service(
            "svc",
            vec![rrpc_core::ServiceEndpoint::new("only", "localhost", 9000, 1)],
        ),
    )
}

/// Spawn a task that echoes every REQUEST frame's payload back as a single
/// RESPONSE, immediately.
fn spawn_echo(peer: MemTransport) {
    tokio::spawn(async move {
        loop {
            let Ok(bytes) = peer.recv_frame().await else {
                return;
            };
            let request = RpcMessage::decode(&bytes).unwrap();
            let response = RpcMessage {
                request_id: request.request_id,
                message_type: MessageType::Response,
                flags: 0,
                service_name: request.service_name,
                method_name: request.method_name,
                payload: request.payload,
            };
            let _ = peer.send_frame(response.encode().freeze()).await;
        }
    });
}

#[tokio::test]
async fn unary_echo_round_trip_within_five_seconds() {
    let (client_side, server_side) = MemTransport::pair();
    spawn_echo(server_side);

    let engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(resolver())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        engine.call("svc", "echo", Bytes::from_static(b"Hello RPC!")),
    )
    .await
    .expect("did not time out")
    .expect("call succeeded");

    assert_eq!(&result[..], b"Hello RPC!");
}

#[tokio::test]
async fn reply_timeout_observed_by_2x_deadline() {
    let (client_side, _server_side) = MemTransport::pair();
    // _server_side is held but never polled: nothing ever replies.

    let engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(resolver())
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let start = std::time::Instant::now();
    let result = engine.call("svc", "missing", Bytes::new()).await;
    assert!(matches!(result, Err(RpcError::ReplyTimeout { .. })));
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn no_endpoints_fails_fast() {
    let (client_side, _server_side) = MemTransport::pair();
    let engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(Arc::new(StaticResolver::new()))
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let result = engine.call("nobody-serves-this", "m", Bytes::new()).await;
    assert!(matches!(result, Err(RpcError::NoEndpoints { .. })));
}

#[tokio::test]
async fn rate_limiter_denies_when_exhausted() {
    let (client_side, server_side) = MemTransport::pair();
    spawn_echo(server_side);

    let limiter = Arc::new(rrpc_limiter::TokenBucket::new(1.0, 1.0).unwrap());
    let engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(resolver())
        .rate_limiter(limiter)
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();

    let first = engine.call("svc", "echo", Bytes::from_static(b"x")).await;
    assert!(first.is_ok());
    let second = engine.call("svc", "echo", Bytes::from_static(b"x")).await;
    assert!(matches!(second, Err(RpcError::RateLimited { .. })));
}

#[tokio::test]
async fn fan_in_three_concurrent_calls_see_distinct_counter_values() {
    let (client_side, server_side) = MemTransport::pair();
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let counter = counter.clone();
        tokio::spawn(async move {
            loop {
                let Ok(bytes) = server_side.recv_frame().await else {
                    return;
                };
                let request = RpcMessage::decode(&bytes).unwrap();
                let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let response = RpcMessage {
                    request_id: request.request_id,
                    message_type: MessageType::Response,
                    flags: 0,
                    service_name: request.service_name,
                    method_name: request.method_name,
                    payload: Bytes::from(value.to_le_bytes().to_vec()),
                };
                let _ = server_side.send_frame(response.encode().freeze()).await;
            }
        });
    }

    let engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(resolver())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let (a, b, c) = tokio::join!(
        engine.call("svc", "increment", Bytes::new()),
        engine.call("svc", "increment", Bytes::new()),
        engine.call("svc", "increment", Bytes::new()),
    );

    let mut values: Vec<usize> = [a, b, c]
        .into_iter()
        .map(|r| {
            let bytes = r.unwrap();
            usize::from_le_bytes(bytes[..8].try_into().unwrap())
        })
        .collect();
    values.sort();
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

struct CollectingSubscriber {
    values: Mutex<Vec<i64>>,
    done: tokio::sync::Notify,
}

impl StreamSubscriber for CollectingSubscriber {
    fn on_next(&self, payload: Bytes) {
        self.values.lock().push(i64::from_le_bytes(payload[..8].try_into().unwrap()));
    }

    fn on_error(&self, _error: rrpc_core::RpcError) {
        self.done.notify_one();
    }

    fn on_complete(&self) {
        self.done.notify_one();
    }
}

#[tokio::test]
async fn server_streaming_delivers_values_then_complete() {
    let (client_side, server_side) = MemTransport::pair();
    tokio::spawn(async move {
        let bytes = server_side.recv_frame().await.unwrap();
        let request = RpcMessage::decode(&bytes).unwrap();
        assert!(request.is_streaming());
        for n in 1..=5i64 {
            let response = RpcMessage {
                request_id: request.request_id,
                message_type: MessageType::Response,
                flags: 0,
                service_name: request.service_name.clone(),
                method_name: request.method_name.clone(),
                payload: Bytes::from(n.to_le_bytes().to_vec()),
            };
            server_side.send_frame(response.encode().freeze()).await.unwrap();
        }
        let complete = RpcMessage {
            request_id: request.request_id,
            message_type: MessageType::Complete,
            flags: 0,
            service_name: request.service_name,
            method_name: request.method_name,
            payload: Bytes::new(),
        };
        server_side.send_frame(complete.encode().freeze()).await.unwrap();
    });

    let engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(resolver())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let subscriber = Arc::new(CollectingSubscriber {
        values: Mutex::new(Vec::new()),
        done: tokio::sync::Notify::new(),
    });

    engine
        .stream("svc", "numbers", Bytes::from(5i64.to_le_bytes().to_vec()), subscriber.clone())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), subscriber.done.notified())
        .await
        .expect("subscriber completed");

    let values = subscriber.values.lock().clone();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
    assert_eq!(values.iter().sum::<i64>(), 15);
}

#[tokio::test]
async fn handler_error_is_surfaced_with_message() {
    let (client_side, server_side) = MemTransport::pair();
    tokio::spawn(async move {
        let bytes = server_side.recv_frame().await.unwrap();
        let request = RpcMessage::decode(&bytes).unwrap();
        let payload = rrpc_wire::encode_error_payload(
            rrpc_wire::ErrorPayloadKind::HandlerError,
            "Test error",
        );
        let response = RpcMessage {
            request_id: request.request_id,
            message_type: MessageType::Error,
            flags: 0,
            service_name: request.service_name,
            method_name: request.method_name,
            payload,
        };
        server_side.send_frame(response.encode().freeze()).await.unwrap();
    });

    let engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(resolver())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let result = engine.call("svc", "boom", Bytes::new()).await;
    match result {
        Err(RpcError::HandlerError { message }) => assert!(message.contains("Test error")),
        other => panic!("expected HandlerError, got {other:?}"),
    }
}

#[tokio::test]
async fn close_cancels_pending_calls() {
    let (client_side, _server_side) = MemTransport::pair();
    let mut engine = ClientEngineBuilder::new()
        .transport(client_side)
        .resolver(resolver())
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap();

    let engine_clone = engine.clone();
    let call = tokio::spawn(async move { engine_clone.call("svc", "slow", Bytes::new()).await });

    // Give the call a moment to register in the pending table.
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.close().await;

    let result = call.await.unwrap();
    assert!(matches!(result, Err(RpcError::Cancelled)));
}
