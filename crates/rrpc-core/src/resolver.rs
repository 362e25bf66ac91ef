//! The endpoint resolver external collaborator: `find_endpoints(service) ->
//! Set<ServiceEndpoint>`. Order is significant (SWRR tie-breaking reads the
//! list in the order the resolver returned it), and an empty return is
//! valid — it's how a client observes `NoEndpoints`.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::ServiceEndpoint;

pub trait EndpointResolver: Send + Sync + 'static {
    fn find_endpoints(&self, service_name: &str) -> Vec<ServiceEndpoint>;
}

/// A resolver backed by a fixed, caller-populated table. Not a production
/// service-discovery client (that's an explicit non-goal) — this is the
/// resolver used by tests, examples, and any deployment simple enough not
/// to need dynamic discovery.
#[derive(Debug, Default)]
pub struct StaticResolver {
    table: RwLock<HashMap<String, Vec<ServiceEndpoint>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, name: impl Into<String>, endpoints: Vec<ServiceEndpoint>) -> Self {
        self.table.write().insert(name.into(), endpoints);
        self
    }

    pub fn set(&self, name: impl Into<String>, endpoints: Vec<ServiceEndpoint>) {
        self.table.write().insert(name.into(), endpoints);
    }
}

impl EndpointResolver for StaticResolver {
    fn find_endpoints(&self, service_name: &str) -> Vec<ServiceEndpoint> {
        self.table.read().get(service_name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_returns_empty() {
        let resolver = StaticResolver::new();
        assert!(resolver.find_endpoints("missing").is_empty());
    }

    #[test]
    fn returns_configured_endpoints_in_order() {
        let eps = vec![
            ServiceEndpoint::new("a", "localhost", 9000, 1),
            ServiceEndpoint::new("b", "localhost", 9001, 1),
        ];
        let resolver = StaticResolver::new().with_service("svc", eps.clone());
        assert_eq!(resolver.find_endpoints("svc"), eps);
    }
}
