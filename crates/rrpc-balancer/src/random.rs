use rand::Rng;
use rrpc_core::ServiceEndpoint;

use crate::SelectStrategy;

/// Uniform-random selection, ignoring weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl SelectStrategy for Random {
    fn select(&self, _service: &str, endpoints: &[ServiceEndpoint]) -> Option<ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..endpoints.len());
        Some(endpoints[idx].clone())
    }
}

/// Weighted-random selection: each endpoint's probability is proportional
/// to its weight. Unlike SWRR this makes no attempt at a smooth
/// interleaving across consecutive calls, only a correct long-run
/// distribution.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }
}

impl SelectStrategy for WeightedRandom {
    fn select(&self, _service: &str, endpoints: &[ServiceEndpoint]) -> Option<ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let total: i64 = endpoints.iter().map(|e| e.weight.max(0) as i64).sum();
        if total == 0 {
            return Some(endpoints[0].clone());
        }
        let mut target = rand::thread_rng().gen_range(0..total);
        for endpoint in endpoints {
            let w = endpoint.weight.max(0) as i64;
            if target < w {
                return Some(endpoint.clone());
            }
            target -= w;
        }
        // Unreachable given the running sum above, but keep selection total.
        endpoints.last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn endpoints() -> Vec<ServiceEndpoint> {
        vec![
            ServiceEndpoint::new("a", "localhost", 9000, 5),
            ServiceEndpoint::new("b", "localhost", 9000, 1),
            ServiceEndpoint::new("c", "localhost", 9000, 3),
        ]
    }

    #[test]
    fn random_selects_only_from_candidates() {
        let r = Random::new();
        let eps = endpoints();
        for _ in 0..50 {
            let picked = r.select("svc", &eps).unwrap();
            assert!(eps.iter().any(|e| e.id == picked.id));
        }
    }

    #[test]
    fn random_empty_list_selects_nothing() {
        assert_eq!(Random::new().select("svc", &[]), None);
    }

    #[test]
    fn weighted_random_distribution_matches_weights() {
        let wr = WeightedRandom::new();
        let eps = endpoints();
        let total = 9;
        let n = 100 * total;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..n {
            let picked = wr.select("svc", &eps).unwrap();
            *counts.entry(picked.id).or_insert(0) += 1;
        }
        for (id, w) in [("a", 5), ("b", 1), ("c", 3)] {
            let expected = n as f64 * (w as f64 / total as f64);
            let actual = *counts.get(id).unwrap_or(&0) as f64;
            let ratio = actual / expected;
            assert!((0.8..=1.2).contains(&ratio), "endpoint {id} ratio {ratio}");
        }
    }

    #[test]
    fn weighted_random_zero_total_picks_first() {
        let wr = WeightedRandom::new();
        let eps = vec![
            ServiceEndpoint::new("a", "localhost", 9000, 0),
            ServiceEndpoint::new("b", "localhost", 9000, 0),
        ];
        assert_eq!(wr.select("svc", &eps).unwrap().id, "a");
    }
}
