use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rrpc_core::ServiceEndpoint;

use crate::SelectStrategy;

/// Naive round-robin: cycles through the endpoint list in order, one
/// cursor per service key. Included for completeness alongside SWRR; does
/// not account for weight.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: Mutex<HashMap<String, AtomicUsize>>,
}

impl Clone for RoundRobin {
    fn clone(&self) -> Self {
        let cursors = self.cursors.lock();
        let cloned = cursors
            .iter()
            .map(|(k, v)| (k.clone(), AtomicUsize::new(v.load(Ordering::Relaxed))))
            .collect();
        RoundRobin {
            cursors: Mutex::new(cloned),
        }
    }
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectStrategy for RoundRobin {
    fn select(&self, service: &str, endpoints: &[ServiceEndpoint]) -> Option<ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let mut cursors = self.cursors.lock();
        let cursor = cursors
            .entry(service.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
        Some(endpoints[cursor % endpoints.len()].clone())
    }
}
