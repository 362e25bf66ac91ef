//! Per-service and global RPC metrics.
//!
//! Every counter is a plain atomic RMW; max/min use `fetch_max`/`fetch_min`
//! (a CAS loop under the hood on platforms without a native instruction).
//! The monitoring surface is owned by whichever engine is constructed with
//! it (see `rrpc-client`/`rrpc-server` builders) — there is no global
//! mutable state here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

/// Sentinel stored in `duration_min_ns` before any response has been
/// recorded; `snapshot()` reports this back as `None`.
const UNSET_MIN: u64 = u64::MAX;

/// Atomic counters for one service (or the global aggregate).
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests: AtomicU64,
    responses: AtomicU64,
    errors: AtomicU64,
    timeout_errors: AtomicU64,
    bytes: AtomicU64,
    duration_sum_ns: AtomicU64,
    duration_max_ns: AtomicU64,
    duration_min_ns: AtomicU64,
    dropped_replies: AtomicU64,
}

/// Non-atomic point-in-time view of a [`ServiceMetrics`], suitable for
/// logging or serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub responses: u64,
    pub errors: u64,
    pub timeout_errors: u64,
    pub bytes: u64,
    pub duration_sum_ns: u64,
    pub duration_max_ns: u64,
    pub duration_min_ns: Option<u64>,
    pub dropped_replies: u64,
}

impl ServiceMetrics {
    fn new() -> Self {
        Self {
            duration_min_ns: AtomicU64::new(UNSET_MIN),
            ..Default::default()
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, bytes: u64, duration: Duration) {
        self.responses.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        let ns = duration.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.duration_sum_ns.fetch_add(ns, Ordering::Relaxed);
        self.duration_max_ns.fetch_max(ns, Ordering::Relaxed);
        self.duration_min_ns.fetch_min(ns, Ordering::Relaxed);
    }

    pub fn record_error(&self, is_timeout: bool) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if is_timeout {
            self.timeout_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A reply-emission attempt (unary response or a streaming sink's
    /// next/error/complete frame) gave up after its send-deadline elapsed
    /// while still back-pressured. The caller already attempted (or is
    /// about to attempt) one final best-effort ERROR emission; this counter
    /// is the only durable record that a reply never made it out.
    pub fn record_dropped_reply(&self) {
        self.dropped_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let min = self.duration_min_ns.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeout_errors: self.timeout_errors.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            duration_sum_ns: self.duration_sum_ns.load(Ordering::Relaxed),
            duration_max_ns: self.duration_max_ns.load(Ordering::Relaxed),
            duration_min_ns: if min == UNSET_MIN { None } else { Some(min) },
            dropped_replies: self.dropped_replies.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.responses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.timeout_errors.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        self.duration_sum_ns.store(0, Ordering::Relaxed);
        self.duration_max_ns.store(0, Ordering::Relaxed);
        self.duration_min_ns.store(UNSET_MIN, Ordering::Relaxed);
        self.dropped_replies.store(0, Ordering::Relaxed);
    }
}

/// Per-service and global metrics, injected into client/server engines at
/// construction time.
#[derive(Debug, Default)]
pub struct RpcMetrics {
    global: ServiceMetrics,
    per_service: RwLock<HashMap<String, Arc<ServiceMetrics>>>,
}

impl RpcMetrics {
    pub fn new() -> Self {
        Self {
            global: ServiceMetrics::new(),
            per_service: RwLock::new(HashMap::new()),
        }
    }

    /// Look up (creating if absent) the counters for `service`. Read and
    /// write paths share this so that querying a never-seen service
    /// auto-creates its zeroed entry, per the monitoring surface's
    /// auto-create policy.
    fn service(&self, service: &str) -> Arc<ServiceMetrics> {
        if let Some(existing) = self.per_service.read().get(service) {
            return existing.clone();
        }
        self.per_service
            .write()
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(ServiceMetrics::new()))
            .clone()
    }

    pub fn record_request(&self, service: &str) {
        self.service(service).record_request();
        self.global.record_request();
    }

    pub fn record_response(&self, service: &str, bytes: u64, duration: Duration) {
        self.service(service).record_response(bytes, duration);
        self.global.record_response(bytes, duration);
    }

    pub fn record_error(&self, service: &str, is_timeout: bool) {
        self.service(service).record_error(is_timeout);
        self.global.record_error(is_timeout);
    }

    pub fn record_dropped_reply(&self, service: &str) {
        self.service(service).record_dropped_reply();
        self.global.record_dropped_reply();
    }

    /// Snapshot for one service. A service that has never been recorded
    /// against returns a zero-initialized snapshot rather than `None`.
    pub fn service_snapshot(&self, service: &str) -> MetricsSnapshot {
        self.service(service).snapshot()
    }

    pub fn global_snapshot(&self) -> MetricsSnapshot {
        self.global.snapshot()
    }

    pub fn reset(&self) {
        self.global.reset();
        for metrics in self.per_service.read().values() {
            metrics.reset();
        }
    }

    pub fn reset_service(&self, service: &str) {
        if let Some(metrics) = self.per_service.read().get(service) {
            metrics.reset();
        }
    }
}
