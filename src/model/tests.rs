use super::*;

fn spec() -> ResourceSpec {
    ResourceSpec {
        gpu_model: "RTX 4090".to_string(),
        gpu_count: 1,
        volume_gb: 500,
    }
}

#[test]
fn test_new_instance_starts_healthy_and_unassociated() {
    let inst = Instance::new(
        InstanceId::from("i-101"),
        HostId::from("h-fra1-07"),
        SlotId::new("slot-0"),
        spec(),
        FailoverPolicy::default(),
    );

    assert_eq!(inst.phase, FailoverPhase::Healthy);
    assert_eq!(inst.configured_strategy, Strategy::None);
    assert!(inst.active_association.is_none());
}

#[test]
fn test_strategy_alternate() {
    assert_eq!(Strategy::WarmPool.alternate(), Strategy::CpuStandby);
    assert_eq!(Strategy::CpuStandby.alternate(), Strategy::WarmPool);
    assert_eq!(Strategy::None.alternate(), Strategy::None);
}

#[test]
fn test_phase_terminal_and_recovering() {
    assert!(FailoverPhase::Failed.is_terminal());
    assert!(!FailoverPhase::Healthy.is_terminal());
    assert!(!FailoverPhase::ActivationFailed.is_terminal());

    assert!(!FailoverPhase::Healthy.is_recovering());
    assert!(!FailoverPhase::Failed.is_recovering());
    assert!(FailoverPhase::Degraded.is_recovering());
    assert!(FailoverPhase::SyncingBack.is_recovering());
}

#[test]
fn test_phase_names_are_snake_case() {
    assert_eq!(FailoverPhase::ActiveOnStandby.as_str(), "active_on_standby");
    assert_eq!(FailoverPhase::StrategySelected.as_str(), "strategy_selected");
    assert_eq!(format!("{}", FailoverPhase::RestoringPrimary), "restoring_primary");
}

#[test]
fn test_host_free_slots_saturates() {
    let mut host = Host {
        id: HostId::from("h-1"),
        region: "eu-central".to_string(),
        slots_total: 2,
        slots_used: 1,
        shared_volume_capable: true,
    };
    assert_eq!(host.free_slots(), 1);

    host.slots_used = 5;
    assert_eq!(host.free_slots(), 0);
}

#[test]
fn test_sync_age() {
    let now = Utc::now();
    let assoc = StandbyAssociation {
        primary: InstanceId::from("i-1"),
        resource: StandbyResourceRef {
            provider: "hetzner".to_string(),
            zone: "fsn1".to_string(),
            class: "cpu-8-32".to_string(),
            resource_id: "sb-1".to_string(),
        },
        sync_state: SyncState::Fresh,
        last_synced_at: Some(now - chrono::Duration::seconds(45)),
    };

    let age = assoc.sync_age(now).unwrap();
    assert_eq!(age.num_seconds(), 45);

    let unsynced = StandbyAssociation {
        last_synced_at: None,
        ..assoc
    };
    assert!(unsynced.sync_age(now).is_none());
}

#[test]
fn test_id_serde_is_transparent() {
    let id = InstanceId::from("i-42");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"i-42\"");

    let back: InstanceId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_strategy_serde_snake_case() {
    assert_eq!(
        serde_json::to_string(&Strategy::WarmPool).unwrap(),
        "\"warm_pool\""
    );
    assert_eq!(
        serde_json::from_str::<Strategy>("\"cpu_standby\"").unwrap(),
        Strategy::CpuStandby
    );
}
