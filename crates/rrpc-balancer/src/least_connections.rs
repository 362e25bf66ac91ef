use std::collections::HashMap;

use parking_lot::Mutex;
use rrpc_core::ServiceEndpoint;

use crate::SelectStrategy;

/// Selects the endpoint with the fewest externally-reported in-flight
/// requests, ties broken by list order. The caller is responsible for
/// pairing `increment`/`decrement` around each send — this strategy has no
/// way to observe completion on its own.
#[derive(Debug, Default)]
pub struct LeastConnections {
    in_flight: Mutex<HashMap<String, i64>>,
}

impl Clone for LeastConnections {
    fn clone(&self) -> Self {
        LeastConnections {
            in_flight: Mutex::new(self.in_flight.lock().clone()),
        }
    }
}

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, endpoint_id: &str) {
        *self.in_flight.lock().entry(endpoint_id.to_string()).or_insert(0) += 1;
    }

    pub fn decrement(&self, endpoint_id: &str) {
        let mut guard = self.in_flight.lock();
        if let Some(count) = guard.get_mut(endpoint_id) {
            *count -= 1;
        }
    }

    pub fn in_flight_count(&self, endpoint_id: &str) -> i64 {
        *self.in_flight.lock().get(endpoint_id).unwrap_or(&0)
    }
}

impl SelectStrategy for LeastConnections {
    fn select(&self, _service: &str, endpoints: &[ServiceEndpoint]) -> Option<ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let counts = self.in_flight.lock();
        let mut best = 0;
        let mut best_count = counts.get(endpoints[0].id.as_str()).copied().unwrap_or(0);
        for (i, endpoint) in endpoints.iter().enumerate().skip(1) {
            let count = counts.get(endpoint.id.as_str()).copied().unwrap_or(0);
            if count < best_count {
                best = i;
                best_count = count;
            }
        }
        Some(endpoints[best].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<ServiceEndpoint> {
        vec![
            ServiceEndpoint::new("a", "localhost", 9000, 1),
            ServiceEndpoint::new("b", "localhost", 9000, 1),
        ]
    }

    #[test]
    fn picks_the_endpoint_with_fewest_in_flight() {
        let lc = LeastConnections::new();
        let eps = endpoints();
        lc.increment("a");
        lc.increment("a");
        assert_eq!(lc.select("svc", &eps).unwrap().id, "b");
    }

    #[test]
    fn decrement_rebalances_back() {
        let lc = LeastConnections::new();
        let eps = endpoints();
        lc.increment("a");
        lc.increment("a");
        lc.decrement("a");
        lc.decrement("a");
        assert_eq!(lc.in_flight_count("a"), 0);
        // Equal counts: ties broken by list order -> "a" first.
        assert_eq!(lc.select("svc", &eps).unwrap().id, "a");
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert_eq!(LeastConnections::new().select("svc", &[]), None);
    }
}
