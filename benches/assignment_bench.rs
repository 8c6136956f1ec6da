//! # Assignment Benchmarks
//!
//! Cost of ordering endpoints per algorithm, and of a full coordinator call
//! including the rank lookup against the host inventory.
//!
//! ## Running Benchmarks
//! ```bash
//! cargo bench --bench assignment_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use indirect_agent_lb::core::types::{HostType, HypervisorType, ResourceState};
use indirect_agent_lb::load_balancing::assign;
use indirect_agent_lb::{
    Endpoint, HostIdentity, IndirectAgentLoadBalancer, LbAlgorithm, LbConfig,
    StaticHostInventory,
};

fn endpoints(count: usize) -> Vec<Endpoint> {
    (0..count).map(|i| Endpoint::new(format!("10.0.{}.{}", i / 256, i % 256))).collect()
}

fn balancer(algorithm: LbAlgorithm, hosts: u64) -> IndirectAgentLoadBalancer {
    let mut config = LbConfig::default();
    config.management_server.addresses = Endpoint::join(&endpoints(5));
    config.management_server.lb_algorithm = algorithm.to_string();

    let inventory = StaticHostInventory::from_hosts((1..=hosts).map(|id| HostIdentity {
        id,
        data_center_id: 1,
        cluster_id: Some(id % 8),
        hypervisor_type: HypervisorType::Kvm,
        host_type: HostType::Routing,
        resource_state: ResourceState::Enabled,
    }));

    IndirectAgentLoadBalancer::new(Arc::new(config), Arc::new(inventory))
}

/// Benchmark the pure ordering step
fn bench_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign");

    for count in [3usize, 16, 128] {
        let list = endpoints(count);
        for algorithm in LbAlgorithm::ALL {
            group.bench_with_input(BenchmarkId::new(algorithm.as_str(), count), &list, |b, list| {
                b.iter(|| assign(black_box(Some(42)), black_box(list), algorithm, black_box(41)))
            });
        }
    }

    group.finish();
}

/// Benchmark a coordinator call, dominated by the inventory rank lookup
fn bench_management_server_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("management_server_list");

    for hosts in [10u64, 1_000, 10_000] {
        for algorithm in [LbAlgorithm::Static, LbAlgorithm::RoundRobin] {
            let lb = balancer(algorithm, hosts);
            group.bench_with_input(BenchmarkId::new(algorithm.as_str(), hosts), &hosts, |b, hosts| {
                b.iter(|| lb.get_management_server_list(black_box(Some(*hosts / 2)), 1, None))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_assign, bench_management_server_list);
criterion_main!(benches);
