//! The pending-request table: a concurrent map from correlation id to the
//! waiter that should complete when a matching reply arrives, or when the
//! reaper trips its deadline first.
//!
//! At most one producer ever observes a given entry: the reply-poll task and
//! the reaper both call `remove`, and the map guarantees only one of them
//! gets `Some` back. The loser's in-hand payload/timeout is simply dropped,
//! satisfying the "completions MUST be idempotent under race" invariant
//! without any extra bookkeeping at the call site.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use rrpc_core::RpcError;
use tokio::sync::oneshot;

use crate::subscriber::StreamSubscriber;

/// What a pending entry resolves: a one-shot unary reply, or an ongoing
/// streaming subscription that stays in the table until a terminal frame.
pub(crate) enum Completion {
    Unary(oneshot::Sender<Result<Bytes, RpcError>>),
    Streaming(Arc<dyn StreamSubscriber>),
}

pub(crate) struct PendingRequest {
    pub(crate) service: String,
    pub(crate) method: String,
    pub(crate) deadline: Instant,
    #[allow(dead_code)] // not read yet; kept for future diagnostics (age-of-entry reporting)
    pub(crate) created_at: Instant,
    pub(crate) completion: Completion,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct DuplicateCorrelationId;

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<u64, PendingRequest>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry. Fails if `correlation_id` is already present;
    /// since ids are assigned by a monotonic, non-wrapping counter within a
    /// session, this should never happen in practice, but we still surface
    /// it rather than silently clobbering an in-flight waiter.
    pub(crate) fn insert(
        &self,
        correlation_id: u64,
        request: PendingRequest,
    ) -> Result<(), DuplicateCorrelationId> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&correlation_id) {
            return Err(DuplicateCorrelationId);
        }
        entries.insert(correlation_id, request);
        Ok(())
    }

    pub(crate) fn remove(&self, correlation_id: u64) -> Option<PendingRequest> {
        self.entries.lock().remove(&correlation_id)
    }

    /// Look up a streaming entry without removing it, invoking `f` with the
    /// subscriber while the table lock is *not* held (user code may run
    /// arbitrarily long `on_next` logic; holding the lock across it would
    /// stall every other caller).
    pub(crate) fn streaming_subscriber(&self, correlation_id: u64) -> Option<Arc<dyn StreamSubscriber>> {
        let entries = self.entries.lock();
        match entries.get(&correlation_id) {
            Some(PendingRequest {
                completion: Completion::Streaming(sink),
                ..
            }) => Some(sink.clone()),
            _ => None,
        }
    }

    /// Remove and return every entry whose deadline has passed. Callers
    /// complete each with `Timeout` *outside* the table lock.
    pub(crate) fn sweep_expired(&self, now: Instant) -> Vec<(u64, PendingRequest)> {
        let mut entries = self.entries.lock();
        let expired_ids: Vec<u64> = entries
            .iter()
            .filter(|(_, req)| req.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired_ids
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|req| (id, req)))
            .collect()
    }

    /// Drain every entry, regardless of deadline. Used on engine shutdown
    /// to cancel whatever is still outstanding.
    pub(crate) fn drain(&self) -> Vec<(u64, PendingRequest)> {
        self.entries.lock().drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn dummy_request(deadline: Instant) -> (PendingRequest, oneshot::Receiver<Result<Bytes, RpcError>>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingRequest {
                service: "svc".into(),
                method: "m".into(),
                deadline,
                created_at: Instant::now(),
                completion: Completion::Unary(tx),
            },
            rx,
        )
    }

    #[test]
    fn duplicate_insert_fails() {
        let table = PendingTable::new();
        let (req1, _rx1) = dummy_request(Instant::now() + Duration::from_secs(1));
        let (req2, _rx2) = dummy_request(Instant::now() + Duration::from_secs(1));
        table.insert(1, req1).unwrap();
        assert_eq!(table.insert(1, req2), Err(DuplicateCorrelationId));
    }

    #[test]
    fn remove_is_once_only() {
        let table = PendingTable::new();
        let (req, _rx) = dummy_request(Instant::now() + Duration::from_secs(1));
        table.insert(7, req).unwrap();
        assert!(table.remove(7).is_some());
        assert!(table.remove(7).is_none());
    }

    #[test]
    fn sweep_expired_only_removes_past_deadline() {
        let table = PendingTable::new();
        let now = Instant::now();
        let (fresh, _rx1) = dummy_request(now + Duration::from_secs(10));
        let (expired, _rx2) = dummy_request(now - Duration::from_millis(1));
        table.insert(1, fresh).unwrap();
        table.insert(2, expired).unwrap();

        let swept = table.sweep_expired(now);
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].0, 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn drain_removes_everything_regardless_of_deadline() {
        let table = PendingTable::new();
        let now = Instant::now();
        let (a, _rx1) = dummy_request(now + Duration::from_secs(10));
        let (b, _rx2) = dummy_request(now + Duration::from_secs(10));
        table.insert(1, a).unwrap();
        table.insert(2, b).unwrap();
        assert_eq!(table.drain().len(), 2);
        assert_eq!(table.len(), 0);
    }
}
