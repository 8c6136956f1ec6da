use rand::seq::SliceRandom;

use crate::core::types::Endpoint;

/// Orders the management server endpoints handed to a single agent
///
/// Implementations are stateless: the same inputs give the same ordering
/// except where the strategy is explicitly randomized.
pub trait AssignmentStrategy: Send + Sync {
    /// Canonical configuration name of the strategy
    fn name(&self) -> &'static str;

    /// Order `endpoints` for the host at `host_order_index` in its zone
    fn sort(&self, endpoints: &[Endpoint], host_order_index: usize) -> Vec<Endpoint>;

    /// Whether the host's rank in the zone influences the result
    fn needs_host_order(&self) -> bool {
        false
    }

    /// Whether a list an agent reports is still consistent with `expected`
    fn compare(&self, expected: &[Endpoint], reported: &[Endpoint]) -> bool {
        expected == reported
    }
}

/// Same order for every host
pub struct StaticAssignment;

impl AssignmentStrategy for StaticAssignment {
    fn name(&self) -> &'static str {
        "static"
    }

    fn sort(&self, endpoints: &[Endpoint], _host_order_index: usize) -> Vec<Endpoint> {
        endpoints.to_vec()
    }
}

/// Rotates the list left by the host's rank
///
/// `n` consecutive ranks each get a different primary, and a host keeps its
/// primary as long as its rank and the endpoint list are unchanged.
pub struct RoundRobinAssignment;

impl AssignmentStrategy for RoundRobinAssignment {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn sort(&self, endpoints: &[Endpoint], host_order_index: usize) -> Vec<Endpoint> {
        let mut ordered = endpoints.to_vec();
        if !ordered.is_empty() {
            let pivot = host_order_index % ordered.len();
            ordered.rotate_left(pivot);
        }
        ordered
    }

    fn needs_host_order(&self) -> bool {
        true
    }
}

/// Uniformly random permutation on every call
pub struct ShuffleAssignment;

impl AssignmentStrategy for ShuffleAssignment {
    fn name(&self) -> &'static str {
        "shuffle"
    }

    fn sort(&self, endpoints: &[Endpoint], _host_order_index: usize) -> Vec<Endpoint> {
        let mut ordered = endpoints.to_vec();
        ordered.shuffle(&mut rand::thread_rng());
        ordered
    }

    // Any permutation is a valid shuffle result
    fn compare(&self, expected: &[Endpoint], reported: &[Endpoint]) -> bool {
        if expected.len() != reported.len() {
            return false;
        }
        let mut expected = expected.to_vec();
        let mut reported = reported.to_vec();
        expected.sort_unstable();
        reported.sort_unstable();
        expected == reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn endpoints(addresses: &[&str]) -> Vec<Endpoint> {
        addresses.iter().map(|a| Endpoint::from(*a)).collect()
    }

    #[test]
    fn test_static_ignores_rank() {
        let list = endpoints(&["a", "b", "c"]);
        for rank in 0..5 {
            assert_eq!(StaticAssignment.sort(&list, rank), list);
        }
    }

    #[test]
    fn test_round_robin_rotation() {
        let list = endpoints(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);

        assert_eq!(RoundRobinAssignment.sort(&list, 0), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(RoundRobinAssignment.sort(&list, 1), vec!["10.0.0.2", "10.0.0.3", "10.0.0.1"]);
        assert_eq!(RoundRobinAssignment.sort(&list, 2), vec!["10.0.0.3", "10.0.0.1", "10.0.0.2"]);
        assert_eq!(RoundRobinAssignment.sort(&list, 3), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_round_robin_primaries_cover_all_endpoints() {
        let list = endpoints(&["a", "b", "c", "d"]);
        for start in 0..8 {
            let primaries: HashSet<_> = (start..start + list.len())
                .map(|rank| RoundRobinAssignment.sort(&list, rank)[0].clone())
                .collect();
            assert_eq!(primaries.len(), list.len());
        }
    }

    #[test]
    fn test_round_robin_single_endpoint() {
        let list = endpoints(&["only"]);
        assert_eq!(RoundRobinAssignment.sort(&list, 17), list);
        assert!(RoundRobinAssignment.sort(&[], 3).is_empty());
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let list = endpoints(&["a", "b", "c", "d", "e"]);
        for _ in 0..20 {
            let shuffled = ShuffleAssignment.sort(&list, 0);
            assert_eq!(shuffled.len(), list.len());
            assert_eq!(
                shuffled.iter().collect::<HashSet<_>>(),
                list.iter().collect::<HashSet<_>>()
            );
        }
    }

    #[test]
    fn test_compare() {
        let list = endpoints(&["a", "b", "c"]);
        let rotated = endpoints(&["b", "c", "a"]);

        assert!(StaticAssignment.compare(&list, &list));
        assert!(!StaticAssignment.compare(&list, &rotated));
        assert!(!RoundRobinAssignment.compare(&list, &rotated));
        assert!(ShuffleAssignment.compare(&list, &rotated));
        assert!(!ShuffleAssignment.compare(&list, &endpoints(&["a", "b"])));
        assert!(!ShuffleAssignment.compare(&list, &endpoints(&["a", "b", "d"])));
    }

    #[test]
    fn test_host_order_requirement() {
        assert!(!StaticAssignment.needs_host_order());
        assert!(RoundRobinAssignment.needs_host_order());
        assert!(!ShuffleAssignment.needs_host_order());
    }
}
