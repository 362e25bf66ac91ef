//! Endpoint selection strategies.
//!
//! [`Swrr`] (smooth weighted round-robin) is the primary strategy this
//! crate exists for. The peer strategies (`RoundRobin`, `Random`,
//! `WeightedRandom`, `LeastConnections`) are included for completeness,
//! selected via the [`Balancer`] enum at client construction time.

mod least_connections;
mod random;
mod round_robin;
mod swrr;

pub use least_connections::LeastConnections;
pub use random::{Random, WeightedRandom};
pub use round_robin::RoundRobin;
pub use swrr::Swrr;

use enum_dispatch::enum_dispatch;
use rrpc_core::ServiceEndpoint;

/// Common selection contract implemented by every strategy.
#[enum_dispatch]
pub trait SelectStrategy: Send + Sync {
    /// Select one endpoint from `endpoints` for calls keyed by `service`.
    /// Returns `None` if `endpoints` is empty.
    fn select(&self, service: &str, endpoints: &[ServiceEndpoint]) -> Option<ServiceEndpoint>;
}

/// The configured load-balancing strategy for a client engine.
///
/// Dispatch over the concrete strategy is a single match via
/// `enum_dispatch`, avoiding a `Box<dyn SelectStrategy>` on the call path.
#[enum_dispatch(SelectStrategy)]
#[derive(Debug, Clone)]
pub enum Balancer {
    Swrr(Swrr),
    RoundRobin(RoundRobin),
    Random(Random),
    WeightedRandom(WeightedRandom),
    LeastConnections(LeastConnections),
}

impl Balancer {
    /// Record that a request was dispatched to `endpoint_id`. Only
    /// `LeastConnections` tracks this; every other strategy ignores it,
    /// since only `LeastConnections` needs the increment/decrement around
    /// each send to keep its in-flight counts accurate.
    pub fn increment_in_flight(&self, endpoint_id: &str) {
        if let Balancer::LeastConnections(lc) = self {
            lc.increment(endpoint_id);
        }
    }

    pub fn decrement_in_flight(&self, endpoint_id: &str) {
        if let Balancer::LeastConnections(lc) = self {
            lc.decrement(endpoint_id);
        }
    }
}

impl Default for Balancer {
    fn default() -> Self {
        Balancer::Swrr(Swrr::new())
    }
}
