//! Smooth weighted round-robin.
//!
//! Per-service node tables are reconciled against the caller-supplied
//! endpoint list on every selection: this is the per-endpoint weighted-node
//! variant of the nginx-style smooth-weighted-round-robin construction (as
//! opposed to a single counter shared across all services, which does not
//! preserve the expected selection sequence once more than one service is
//! in play).

use std::collections::HashMap;

use parking_lot::Mutex;
use rrpc_core::ServiceEndpoint;

use crate::SelectStrategy;

#[derive(Debug, Clone)]
struct WeightedNode {
    endpoint: ServiceEndpoint,
    effective_weight: i32,
    current_weight: i32,
}

/// Smooth weighted round-robin strategy. One node table per service-name
/// key, guarded by a single mutex (sufficient to preserve the sequence
/// property since selection for a given key is always serialized through
/// it).
#[derive(Debug, Default)]
pub struct Swrr {
    tables: Mutex<HashMap<String, Vec<WeightedNode>>>,
}

impl Clone for Swrr {
    fn clone(&self) -> Self {
        Swrr {
            tables: Mutex::new(self.tables.lock().clone()),
        }
    }
}

impl Swrr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all per-service state. Mostly useful in tests that want a
    /// clean slate without constructing a new balancer.
    pub fn clear(&self) {
        self.tables.lock().clear();
    }
}

impl SelectStrategy for Swrr {
    fn select(&self, service: &str, endpoints: &[ServiceEndpoint]) -> Option<ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }

        let mut tables = self.tables.lock();
        let table = tables.entry(service.to_string()).or_default();
        reconcile(table, endpoints, service);

        let total: i32 = table.iter().map(|n| n.effective_weight).sum();
        if total == 0 {
            return Some(endpoints[0].clone());
        }

        for node in table.iter_mut() {
            node.current_weight += node.effective_weight;
        }

        let mut best = 0;
        for i in 1..table.len() {
            if table[i].current_weight > table[best].current_weight {
                best = i;
            }
        }

        table[best].current_weight -= total;
        Some(table[best].endpoint.clone())
    }
}

/// Rebuild `table` to match `endpoints`, preserving `current_weight` for
/// endpoints that are unchanged, resetting it for endpoints whose weight
/// changed, and dropping endpoints no longer present. The rebuilt table's
/// order follows `endpoints`' order so
/// tie-breaking by insertion order stays well-defined.
fn reconcile(table: &mut Vec<WeightedNode>, endpoints: &[ServiceEndpoint], service: &str) {
    let mut by_id: HashMap<&str, &WeightedNode> =
        table.iter().map(|n| (n.endpoint.id.as_str(), n)).collect();

    let mut rebuilt = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        match by_id.remove(endpoint.id.as_str()) {
            Some(existing) if existing.effective_weight == endpoint.weight => {
                rebuilt.push(WeightedNode {
                    endpoint: endpoint.clone(),
                    effective_weight: existing.effective_weight,
                    current_weight: existing.current_weight,
                });
            }
            Some(_) => {
                tracing::debug!(service, endpoint = %endpoint.id, weight = endpoint.weight, "swrr: endpoint weight changed, resetting node");
                rebuilt.push(WeightedNode {
                    endpoint: endpoint.clone(),
                    effective_weight: endpoint.weight,
                    current_weight: 0,
                });
            }
            None => {
                tracing::debug!(service, endpoint = %endpoint.id, weight = endpoint.weight, "swrr: endpoint added");
                rebuilt.push(WeightedNode {
                    endpoint: endpoint.clone(),
                    effective_weight: endpoint.weight,
                    current_weight: 0,
                });
            }
        }
    }
    if !by_id.is_empty() {
        tracing::debug!(service, removed = by_id.len(), "swrr: endpoints removed from table");
    }

    *table = rebuilt;
}
