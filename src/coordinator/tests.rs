use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use super::*;
use crate::events::{FailoverEvent, FailoverLog, FailoverOutcome};
use crate::heartbeat::{HeartbeatConfig, HeartbeatMonitor, MockProbe, Probe};
use crate::model::{
    FailoverPhase, FailoverPolicy, Host, HostId, Instance, InstanceId, ResourceSpec, SlotId,
    WarmPoolState,
};
use crate::notify::{
    DeliveryTransport, MockDeliveryTransport, Notification, Notifier, NotifyConfig,
};
use crate::provider::{ComputeProvider, MockComputeProvider, SlotStatus};
use crate::registry::InstanceRegistry;
use crate::snapshot::{MockSnapshotStore, SnapshotStore};
use crate::standby::{StandbyConfig, StandbyManager};
use crate::warmpool::{WarmPoolConfig, WarmPoolManager};

struct Fixture {
    coordinator: Arc<Coordinator>,
    registry: Arc<InstanceRegistry>,
    log: Arc<FailoverLog>,
    provider: Arc<MockComputeProvider>,
    snapshots: Arc<MockSnapshotStore>,
    monitor: Arc<HeartbeatMonitor>,
    transport: Arc<MockDeliveryTransport>,
    warm_pool: Arc<WarmPoolManager>,
    standby: Arc<StandbyManager>,
    signals: mpsc::Sender<Signal>,
}

fn fixture() -> Fixture {
    let provider = Arc::new(MockComputeProvider::new());
    let snapshots = Arc::new(MockSnapshotStore::new());
    let registry = Arc::new(InstanceRegistry::new());
    let log = Arc::new(FailoverLog::new());

    let warm_pool = Arc::new(WarmPoolManager::new(
        Arc::clone(&provider) as Arc<dyn ComputeProvider>,
        Arc::clone(&registry),
        WarmPoolConfig::for_testing(),
    ));
    let standby = Arc::new(StandbyManager::new(
        Arc::clone(&provider) as Arc<dyn ComputeProvider>,
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        Arc::clone(&registry),
        StandbyConfig::for_testing(),
    ));

    let (signals, rx) = mpsc::channel(16);
    let probe = Arc::new(MockProbe::new());
    let monitor = Arc::new(HeartbeatMonitor::new(
        probe as Arc<dyn Probe>,
        HeartbeatConfig::for_testing(),
        signals.clone(),
        Arc::clone(&registry),
    ));

    let transport = Arc::new(MockDeliveryTransport::new());
    let (notifier, _notifier_task) = Notifier::spawn(
        Arc::clone(&transport) as Arc<dyn DeliveryTransport>,
        NotifyConfig::for_testing(),
    );

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&registry),
        Arc::clone(&log),
        Arc::clone(&warm_pool),
        Arc::clone(&standby),
        Arc::clone(&monitor),
        notifier,
        CoordinatorConfig::for_testing(),
    ));
    tokio::spawn(Arc::clone(&coordinator).run(rx));

    Fixture {
        coordinator,
        registry,
        log,
        provider,
        snapshots,
        monitor,
        transport,
        warm_pool,
        standby,
        signals,
    }
}

impl Fixture {
    fn register(&self, id: &str, slots_total: u32, shared: bool, policy: FailoverPolicy) -> InstanceId {
        let instance = InstanceId::from(id);
        let host = HostId::new(format!("host-{id}"));
        let slot = SlotId::new(format!("slot-{id}"));
        self.provider.seed_slot(&host, &slot, SlotStatus::Ready);
        self.registry
            .register(
                Instance::new(
                    instance.clone(),
                    host.clone(),
                    slot,
                    ResourceSpec {
                        gpu_model: "RTX 4090".to_string(),
                        gpu_count: 1,
                        volume_gb: 50,
                    },
                    policy,
                ),
                Host {
                    id: host,
                    region: "eu-west".to_string(),
                    slots_total,
                    slots_used: 1,
                    shared_volume_capable: shared,
                },
            )
            .unwrap();
        instance
    }

    async fn degrade(&self, instance: &InstanceId) {
        self.signals
            .send(Signal::Degraded {
                instance: instance.clone(),
                detected_at: Utc::now(),
                simulated: false,
            })
            .await
            .unwrap();
    }

    async fn closed_event(&self, instance: &InstanceId) -> FailoverEvent {
        wait_until(
            || {
                self.log
                    .events_for(instance)
                    .iter()
                    .any(|e| !e.is_open())
            },
            "event to close",
        )
        .await;
        self.log
            .events_for(instance)
            .into_iter()
            .find(|e| !e.is_open())
            .unwrap()
    }

    fn notifications(&self) -> Vec<Notification> {
        self.transport
            .deliveries()
            .iter()
            .filter_map(|d| serde_json::from_slice(&d.body).ok())
            .collect()
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_warm_pool_failover_runs_the_full_loop() {
    let f = fixture();
    let instance = f.register("i-1", 2, true, FailoverPolicy::default());
    f.registry
        .set_configured_strategy(&instance, crate::model::Strategy::WarmPool)
        .unwrap();
    let association = f.warm_pool.provision(&instance).await.unwrap();

    let detected_at = Utc::now();
    f.signals
        .send(Signal::Degraded {
            instance: instance.clone(),
            detected_at,
            simulated: false,
        })
        .await
        .unwrap();

    let event = f.closed_event(&instance).await;
    assert_eq!(event.outcome, Some(FailoverOutcome::Completed));
    assert_eq!(event.strategy, crate::model::Strategy::WarmPool);
    assert!(event.activated_at.unwrap() >= event.detected_at);
    assert_eq!(event.sync_errors, 0);
    assert_eq!(f.registry.phase(&instance), Some(FailoverPhase::Healthy));

    // Warm pool never touches the snapshot store.
    assert_eq!(f.snapshots.fetch_calls(), 0);
    assert_eq!(f.snapshots.create_calls(), 0);

    // The association re-armed with roles swapped.
    let rearmed = f.registry.warm_pool(&instance).unwrap();
    assert_eq!(rearmed.state, WarmPoolState::Ready);
    assert_eq!(rearmed.primary_slot, association.standby_slot);
    assert_eq!(rearmed.standby_slot, association.primary_slot);
    assert!(f.coordinator.is_inflight(&instance) == false);
    assert!(!f.registry.leases().is_held(&instance));

    // Exactly one completed notification for the incident.
    wait_until(
        || {
            f.notifications()
                .iter()
                .any(|n| n.event == "failover.completed")
        },
        "completed notification",
    )
    .await;
    let completed = f
        .notifications()
        .iter()
        .filter(|n| n.event == "failover.completed")
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn test_degraded_signals_coalesce_into_open_workflow() {
    let f = fixture();
    let instance = f.register("i-1", 2, true, FailoverPolicy::default());
    f.warm_pool.provision(&instance).await.unwrap();
    // Slow the boot down so the second signal lands mid-workflow.
    f.provider.set_boot_delay(Duration::from_millis(100));

    f.degrade(&instance).await;
    wait_until(|| f.coordinator.is_inflight(&instance), "workflow start").await;
    f.degrade(&instance).await;
    f.degrade(&instance).await;

    let event = f.closed_event(&instance).await;
    assert_eq!(event.coalesced_signals, 2);
    // One incident, one event row.
    assert_eq!(f.log.events_for(&instance).len(), 1);
}

#[tokio::test]
async fn test_no_strategy_closes_failed_with_zero_manager_calls() {
    let f = fixture();
    let instance = f.register("i-1", 1, false, FailoverPolicy::disabled());

    f.degrade(&instance).await;

    let event = f.closed_event(&instance).await;
    assert_eq!(event.outcome, Some(FailoverOutcome::Failed));
    assert_eq!(event.strategy, crate::model::Strategy::None);
    assert_eq!(f.registry.phase(&instance), Some(FailoverPhase::Failed));
    // Neither manager was asked to do anything.
    assert!(f.provider.calls().is_empty());
    assert_eq!(f.snapshots.fetch_calls(), 0);

    wait_until(
        || f.notifications().iter().any(|n| n.event == "failover.failed"),
        "failure notification",
    )
    .await;
}

#[tokio::test]
async fn test_recovery_during_activation_cancels_and_rolls_back() {
    let f = fixture();
    let instance = f.register("i-1", 2, true, FailoverPolicy::default());
    let association = f.warm_pool.provision(&instance).await.unwrap();
    f.provider.set_boot_delay(Duration::from_millis(150));

    f.degrade(&instance).await;
    wait_until(
        || f.registry.phase(&instance) == Some(FailoverPhase::Activating),
        "activation start",
    )
    .await;

    f.signals
        .send(Signal::Recovered {
            instance: instance.clone(),
        })
        .await
        .unwrap();

    let event = f.closed_event(&instance).await;
    assert_eq!(event.outcome, Some(FailoverOutcome::Cancelled));
    assert_eq!(f.registry.phase(&instance), Some(FailoverPhase::Healthy));

    // Partial standby rolled back: slot stopped, roles unswapped, volume
    // writable on the primary again.
    let rolled_back = f.registry.warm_pool(&instance).unwrap();
    assert_eq!(rolled_back.state, WarmPoolState::Ready);
    assert_eq!(rolled_back.primary_slot, association.primary_slot);
    assert!(f.provider.call_count("stop_slot") >= 1);
    assert!(!f.registry.leases().is_held(&instance));
}

#[tokio::test]
async fn test_activation_timeout_falls_back_to_standby_exactly_once() {
    let f = fixture();
    let instance = f.register("i-1", 2, true, FailoverPolicy::default());
    let association = f.warm_pool.provision(&instance).await.unwrap();
    f.snapshots.seed(&instance, b"snapshot payload");
    // Longer than the warm-pool activation timeout: the boot never makes it.
    // Only the warm-pool standby slot boots slowly; the replacement primary
    // slot reserved during the fallback's restore leg must come up normally.
    f.provider
        .set_slot_boot_delay(&association.standby_slot, Duration::from_secs(2));

    f.degrade(&instance).await;

    let event = f.closed_event(&instance).await;
    assert_eq!(event.outcome, Some(FailoverOutcome::Completed));
    assert_eq!(event.strategy, crate::model::Strategy::CpuStandby);
    assert!(event.has_annotation("fallback"));
    assert!(event.has_annotation("sync_source:snapshot"));
    assert!(event.error_detail.is_some());

    // Exactly one standby activation, never two.
    assert_eq!(f.provider.call_count("start_services"), 1);
    assert_eq!(f.registry.warm_pool_failures(&HostId::new("host-i-1")), 1);

    wait_until(
        || {
            f.notifications()
                .iter()
                .any(|n| n.event == "failover.activation_failed")
        },
        "activation-failed notification",
    )
    .await;
}

#[tokio::test]
async fn test_fallback_disabled_by_policy_is_terminal() {
    let f = fixture();
    let instance = f.register(
        "i-1",
        2,
        true,
        FailoverPolicy {
            warm_pool_enabled: true,
            standby_enabled: false,
        },
    );
    f.warm_pool.provision(&instance).await.unwrap();
    f.provider.set_boot_delay(Duration::from_secs(2));

    f.degrade(&instance).await;

    let event = f.closed_event(&instance).await;
    assert_eq!(event.outcome, Some(FailoverOutcome::Failed));
    assert_eq!(f.registry.phase(&instance), Some(FailoverPhase::Failed));
    // The standby manager was never consulted.
    assert_eq!(f.provider.call_count("provision_standby"), 0);
}

#[tokio::test]
async fn test_simulated_incident_is_annotated() {
    let f = fixture();
    let instance = f.register("i-1", 2, true, FailoverPolicy::default());
    f.warm_pool.provision(&instance).await.unwrap();

    f.signals
        .send(Signal::Degraded {
            instance: instance.clone(),
            detected_at: Utc::now(),
            simulated: true,
        })
        .await
        .unwrap();

    let event = f.closed_event(&instance).await;
    assert!(event.has_annotation("simulated"));
    assert_eq!(event.outcome, Some(FailoverOutcome::Completed));
}

#[tokio::test]
async fn test_degraded_selection_is_annotated_when_slot_reclaimed() {
    let f = fixture();
    // Warm pool configured at registration, but no association was ever
    // provisioned and the host is now full: re-selection degrades.
    let instance = f.register("i-1", 2, true, FailoverPolicy::default());
    f.registry
        .set_configured_strategy(&instance, crate::model::Strategy::WarmPool)
        .unwrap();
    let mut host = f.registry.host_for(&instance).unwrap();
    host.slots_used = host.slots_total;
    f.registry.update_host(host);
    f.snapshots.seed(&instance, b"payload");

    f.degrade(&instance).await;

    let event = f.closed_event(&instance).await;
    assert_eq!(event.strategy, crate::model::Strategy::CpuStandby);
    assert!(event.has_annotation("degraded_selection"));
    assert_eq!(event.outcome, Some(FailoverOutcome::Completed));
}

#[tokio::test]
async fn test_recovery_without_workflow_clears_degraded_phase() {
    let f = fixture();
    let instance = f.register("i-1", 2, true, FailoverPolicy::default());
    f.registry
        .set_phase(&instance, FailoverPhase::Degraded)
        .unwrap();

    f.signals
        .send(Signal::Recovered {
            instance: instance.clone(),
        })
        .await
        .unwrap();

    wait_until(
        || f.registry.phase(&instance) == Some(FailoverPhase::Healthy),
        "phase to clear",
    )
    .await;
    assert!(!f.monitor.is_degraded(&instance));
}

#[tokio::test]
async fn test_standby_failover_restores_snapshot_state() {
    let f = fixture();
    // Single-slot host: standby is the only viable strategy.
    let instance = f.register("i-1", 1, false, FailoverPolicy::default());
    f.registry
        .set_configured_strategy(&instance, crate::model::Strategy::CpuStandby)
        .unwrap();
    let meta = f.snapshots.seed(&instance, b"latest snapshot");

    f.degrade(&instance).await;

    let event = f.closed_event(&instance).await;
    assert_eq!(event.outcome, Some(FailoverOutcome::Completed));
    assert_eq!(event.strategy, crate::model::Strategy::CpuStandby);
    assert!(event.has_annotation("sync_source:snapshot"));
    // The restored primary serves exactly the snapshot's content.
    assert_eq!(
        f.provider.primary_state_hash(&instance).unwrap(),
        meta.content_hash
    );
    // Protection re-armed after the loop closed.
    wait_until(|| f.registry.standby(&instance).is_some(), "standby re-arm").await;
    let _ = &f.standby;
}

#[tokio::test]
async fn test_restore_leg_timeout_closes_the_event_failed() {
    let f = fixture();
    // Single-slot host: standby is the only viable strategy.
    let instance = f.register("i-1", 1, false, FailoverPolicy::default());
    f.registry
        .set_configured_strategy(&instance, crate::model::Strategy::CpuStandby)
        .unwrap();
    f.snapshots.seed(&instance, b"latest snapshot");
    // Activation succeeds, but the replacement primary slot never finishes
    // booting, so the return leg burns its budget.
    f.provider.set_boot_delay(Duration::from_secs(3600));

    f.degrade(&instance).await;

    let event = f.closed_event(&instance).await;
    assert_eq!(event.outcome, Some(FailoverOutcome::Failed));
    assert!(event.error_detail.unwrap().contains("restore failed"));
    assert_eq!(f.registry.phase(&instance), Some(FailoverPhase::Failed));
    wait_until(
        || !f.registry.leases().is_held(&instance),
        "lease release",
    )
    .await;
}
