//! Integration tests for the load balancer: strategies, overload filtering,
//! moving averages and rebalancing.

use std::sync::Arc;

use prometheus_ward::balancer::{LoadBalancer, MigrationHint, SelectionContext, StrategyKind};
use prometheus_ward::config::BalancerConfig;
use prometheus_ward::core::{InMemoryMetricsSink, ResourceKind, Specialization};
use prometheus_ward::infra::{InMemoryDirectory, LocalResource};
use prometheus_ward::util::serde::Urgency;
use tokio::sync::mpsc;

const DOCTOR: ResourceKind = ResourceKind::Doctor;

fn ctx(urgency: u8) -> SelectionContext {
    SelectionContext::for_request(1, Urgency::new(urgency).unwrap())
}

fn balancer(strategy: &str, doctors: &[&str]) -> LoadBalancer {
    let directory = InMemoryDirectory::new();
    for id in doctors {
        directory.register(LocalResource::doctor(*id, Specialization::General));
    }
    let mut balancer = LoadBalancer::new(BalancerConfig {
        strategy: strategy.into(),
        ..BalancerConfig::default()
    })
    .with_directory(Arc::new(directory));
    balancer.discover_all();
    balancer
}

fn assign(balancer: &mut LoadBalancer, id: &str, times: u32) {
    for n in 0..times {
        balancer.record_assignment(id, DOCTOR, u64::from(n));
    }
}

#[test]
fn test_round_robin_cycles_in_discovery_order() {
    let mut lb = balancer("round_robin", &["D1", "D2", "D3"]);
    let picks: Vec<_> = (0..4).filter_map(|_| lb.select(DOCTOR, &ctx(3))).collect();
    assert_eq!(picks, vec!["D1", "D2", "D3", "D1"]);
}

#[test]
fn test_least_loaded_prefers_idle_instance() {
    let mut lb = balancer("least_loaded", &["D1", "D2", "D3"]);
    assign(&mut lb, "D1", 2);
    assign(&mut lb, "D2", 1);
    assert_eq!(lb.select(DOCTOR, &ctx(3)).as_deref(), Some("D3"));

    assign(&mut lb, "D3", 3);
    assert_eq!(lb.select(DOCTOR, &ctx(3)).as_deref(), Some("D2"));
}

#[test]
fn test_overloaded_instances_are_skipped() {
    let mut lb = LoadBalancer::new(BalancerConfig {
        overload_threshold: 2,
        ..BalancerConfig::default()
    });
    lb.register_instance("D1", DOCTOR);
    lb.register_instance("D2", DOCTOR);
    assign(&mut lb, "D1", 3);

    for _ in 0..3 {
        assert_eq!(lb.select(DOCTOR, &ctx(3)).as_deref(), Some("D2"));
    }

    assign(&mut lb, "D2", 3);
    assert_eq!(lb.select(DOCTOR, &ctx(3)), None);
    assert_eq!(lb.select(ResourceKind::Room, &ctx(3)), None);

    let metrics = lb.metrics();
    assert_eq!(metrics.total_requests, 5);
    assert_eq!(metrics.successful_allocations, 3);
    assert!((metrics.success_rate - 0.6).abs() < 1e-9);
}

#[test]
fn test_adaptive_and_weighted_avoid_loaded_instance() {
    let mut lb = balancer("adaptive", &["D1", "D2"]);
    assign(&mut lb, "D1", 1);
    assert_eq!(lb.select(DOCTOR, &ctx(5)).as_deref(), Some("D2"));

    lb.set_strategy(StrategyKind::WeightedRoundRobin);
    assert_eq!(lb.strategy(), StrategyKind::WeightedRoundRobin);
    // Both weights are 10: D1 wins the tie, then the higher current weight alternates.
    let picks: Vec<_> = (0..4).filter_map(|_| lb.select(DOCTOR, &ctx(3))).collect();
    assert_eq!(picks, vec!["D1", "D2", "D1", "D2"]);
}

#[test]
fn test_single_instance_rejects_seventh_selection() {
    let mut lb = balancer("round_robin", &["D1"]);
    for n in 0..6 {
        assert_eq!(lb.select(DOCTOR, &ctx(3)).as_deref(), Some("D1"), "round {n}");
        lb.record_assignment("D1", DOCTOR, n);
    }
    assert_eq!(lb.record("D1").unwrap().current_load, 6);
    assert_eq!(lb.select(DOCTOR, &ctx(3)), None);
}

#[test]
fn test_moving_average_follows_load() {
    let mut lb = balancer("round_robin", &["D1"]);
    assign(&mut lb, "D1", 1);
    let avg = lb.record("D1").unwrap().average_load;
    assert!((avg - 0.1).abs() < 1e-9);

    lb.monitor_tick();
    let avg = lb.record("D1").unwrap().average_load;
    assert!((avg - 0.19).abs() < 1e-9);

    lb.record_release("D1");
    lb.record_release("D1");
    let rec = lb.record("D1").unwrap();
    assert_eq!(rec.current_load, 0);
    assert_eq!(rec.peak_load, 1);
    assert_eq!(rec.allocations, 1);
}

#[test]
fn test_rebalance_moves_load_within_a_kind() {
    let (tx, mut rx) = mpsc::channel(4);
    let mut lb = balancer("round_robin", &["D1", "D2", "D3"]).with_migration_channel(tx);
    lb.register_instance("R1", ResourceKind::Room);
    assign(&mut lb, "D1", 6);

    let hints = lb.rebalance();
    assert_eq!(
        hints,
        vec![MigrationHint {
            kind: DOCTOR,
            from: "D1".into(),
            to: "D2".into(),
        }]
    );
    assert_eq!(rx.try_recv().unwrap(), hints[0]);
    assert_eq!(lb.record("D1").unwrap().current_load, 5);
    assert_eq!(lb.record("D2").unwrap().current_load, 1);
    assert_eq!(lb.record("R1").unwrap().current_load, 0);
}

#[test]
fn test_balanced_pool_produces_no_hints() {
    let mut lb = balancer("round_robin", &["D1", "D2"]);
    assign(&mut lb, "D1", 2);
    assign(&mut lb, "D2", 2);
    assert!(lb.rebalance().is_empty());
    assert!(lb.metrics().load_variance.abs() < 1e-9);
}

#[test]
fn test_publish_metrics_reports_loads() {
    let sink = InMemoryMetricsSink::new(64);
    let mut lb = balancer("least_loaded", &["D1", "D2"]).with_metrics(Arc::new(sink.clone()));
    assign(&mut lb, "D1", 2);
    lb.select(DOCTOR, &ctx(3));
    lb.publish_metrics();

    assert_eq!(sink.gauge("balancer.total_requests"), Some(1.0));
    assert_eq!(sink.gauge("balancer.load.D1"), Some(2.0));
    assert_eq!(sink.gauge("balancer.load.D2"), Some(0.0));
    assert_eq!(sink.gauge("balancer.load_variance"), Some(1.0));
}

#[test]
fn test_full_migration_channel_drops_hints() {
    let (tx, mut rx) = mpsc::channel(1);
    let mut lb = balancer("round_robin", &["D1", "D2", "D3"]).with_migration_channel(tx);
    assign(&mut lb, "D1", 6);

    let first = lb.rebalance();
    let second = lb.rebalance();
    assert_eq!(first[0].to, "D2");
    assert_eq!(second[0].to, "D3");

    assert_eq!(rx.try_recv().unwrap(), first[0]);
    assert!(rx.try_recv().is_err());
}
