use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::coordinator::Signal;
use crate::model::{FailoverPolicy, Host, HostId, Instance, InstanceId, ResourceSpec, SlotId};
use crate::registry::InstanceRegistry;

fn registered(registry: &InstanceRegistry, id: &str) -> InstanceId {
    let instance_id = InstanceId::from(id);
    registry
        .register(
            Instance::new(
                instance_id.clone(),
                HostId::from("h-1"),
                SlotId::new("slot-0"),
                ResourceSpec {
                    gpu_model: "RTX 4090".to_string(),
                    gpu_count: 1,
                    volume_gb: 100,
                },
                FailoverPolicy::default(),
            ),
            Host {
                id: HostId::from("h-1"),
                region: "eu-west".to_string(),
                slots_total: 2,
                slots_used: 1,
                shared_volume_capable: true,
            },
        )
        .unwrap();
    instance_id
}

fn monitor_with(
    config: HeartbeatConfig,
) -> (
    Arc<HeartbeatMonitor>,
    mpsc::Receiver<Signal>,
    Arc<InstanceRegistry>,
) {
    let registry = Arc::new(InstanceRegistry::new());
    let (tx, rx) = mpsc::channel(16);
    let monitor = Arc::new(HeartbeatMonitor::new(
        Arc::new(MockProbe::new()),
        config,
        tx,
        Arc::clone(&registry),
    ));
    (monitor, rx, registry)
}

#[tokio::test]
async fn test_single_miss_does_not_signal() {
    let (monitor, mut rx, registry) = monitor_with(HeartbeatConfig::for_testing());
    let id = registered(&registry, "i-1");

    monitor.observe(&id, ProbeOutcome::Unhealthy).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(monitor.miss_count(&id), 1);
    assert!(!monitor.is_degraded(&id));
}

#[tokio::test]
async fn test_two_consecutive_misses_signal_exactly_once() {
    let (monitor, mut rx, registry) = monitor_with(HeartbeatConfig::for_testing());
    let id = registered(&registry, "i-1");

    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;

    match rx.try_recv().unwrap() {
        Signal::Degraded {
            instance,
            simulated,
            ..
        } => {
            assert_eq!(instance, id);
            assert!(!simulated);
        }
        other => panic!("unexpected signal {other:?}"),
    }

    // Further misses while degraded emit nothing.
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    assert!(rx.try_recv().is_err());
    assert!(monitor.is_degraded(&id));
}

#[tokio::test]
async fn test_healthy_probe_resets_miss_run() {
    let (monitor, mut rx, registry) = monitor_with(HeartbeatConfig::for_testing());
    let id = registered(&registry, "i-1");

    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    monitor.observe(&id, ProbeOutcome::Healthy).await;
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(monitor.miss_count(&id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_misses_outside_window_are_not_consecutive() {
    let config = HeartbeatConfig {
        miss_window: Duration::from_millis(30),
        ..HeartbeatConfig::for_testing()
    };
    let (monitor, mut rx, registry) = monitor_with(config);
    let id = registered(&registry, "i-1");

    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(monitor.miss_count(&id), 1);
}

#[tokio::test]
async fn test_degraded_latch_clears_only_on_acknowledgment() {
    let (monitor, mut rx, registry) = monitor_with(HeartbeatConfig::for_testing());
    let id = registered(&registry, "i-1");

    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    let _ = rx.try_recv().unwrap();

    // A healthy probe reports recovery but does not clear the latch.
    monitor.observe(&id, ProbeOutcome::Healthy).await;
    assert!(matches!(
        rx.try_recv().unwrap(),
        Signal::Recovered { .. }
    ));
    assert!(monitor.is_degraded(&id));

    monitor.acknowledge_recovered(&id);
    assert!(!monitor.is_degraded(&id));

    // A fresh incident after acknowledgment signals again.
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    assert!(matches!(rx.try_recv().unwrap(), Signal::Degraded { .. }));
}

#[tokio::test]
async fn test_transport_errors_within_grace_are_ignored() {
    let config = HeartbeatConfig {
        transport_grace: Duration::from_millis(80),
        ..HeartbeatConfig::for_testing()
    };
    let (monitor, mut rx, registry) = monitor_with(config);
    let id = registered(&registry, "i-1");

    monitor.observe(&id, ProbeOutcome::TransportError).await;
    monitor.observe(&id, ProbeOutcome::TransportError).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(monitor.miss_count(&id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sustained_transport_failure_counts_as_misses() {
    let config = HeartbeatConfig {
        transport_grace: Duration::from_millis(20),
        ..HeartbeatConfig::for_testing()
    };
    let (monitor, mut rx, registry) = monitor_with(config);
    let id = registered(&registry, "i-1");

    monitor.observe(&id, ProbeOutcome::TransportError).await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    monitor.observe(&id, ProbeOutcome::TransportError).await;
    monitor.observe(&id, ProbeOutcome::TransportError).await;

    assert!(matches!(rx.try_recv().unwrap(), Signal::Degraded { .. }));
}

#[tokio::test]
async fn test_retired_instance_outcomes_are_ignored() {
    let (monitor, mut rx, registry) = monitor_with(HeartbeatConfig::for_testing());
    let id = registered(&registry, "i-1");
    registry.decommission(&id).unwrap();

    monitor.observe(&id, ProbeOutcome::Unhealthy).await;
    monitor.observe(&id, ProbeOutcome::Unhealthy).await;

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_probe_task_drives_scripted_outcomes() {
    let registry = Arc::new(InstanceRegistry::new());
    let (tx, mut rx) = mpsc::channel(16);
    let probe = Arc::new(MockProbe::new());
    let monitor = Arc::new(HeartbeatMonitor::new(
        Arc::clone(&probe) as Arc<dyn Probe>,
        HeartbeatConfig::for_testing(),
        tx,
        Arc::clone(&registry),
    ));
    let id = registered(&registry, "i-1");

    probe.script(&id, [ProbeOutcome::Unhealthy, ProbeOutcome::Unhealthy]);
    monitor.start(id.clone());
    assert_eq!(monitor.probed_instances(), 1);

    let signal = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("signal within timeout")
        .expect("channel open");
    assert!(matches!(signal, Signal::Degraded { .. }));

    monitor.stop(&id);
    assert_eq!(monitor.probed_instances(), 0);
}
