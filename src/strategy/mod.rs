//! Pure recovery strategy selection.
//!
//! `select` has no side effects and is called twice per instance: once at
//! registration to record the configured strategy, and again at failover
//! time, because host capacity can change in between. The coordinator treats
//! a weaker answer the second time as a degraded selection, not an error.


use crate::model::{Host, Instance, Strategy};

/// Picks the strongest recovery strategy the instance's host and policy
/// currently permit.
///
/// Warm pool requires a multi-slot host with shared-volume support and
/// either a standby slot already reserved for this instance or a free slot
/// to reserve one from; it wins whenever available because activation is
/// boot-bound rather than transfer-bound. `reserved` reports whether the
/// instance currently holds a warm-pool association (the registry counts a
/// reserved slot as used, so it must not double as the free-slot check).
pub fn select(instance: &Instance, host: &Host, reserved: bool) -> Strategy {
    if instance.policy.warm_pool_enabled && warm_pool_viable(host, reserved) {
        return Strategy::WarmPool;
    }
    if instance.policy.standby_enabled {
        return Strategy::CpuStandby;
    }
    Strategy::None
}

fn warm_pool_viable(host: &Host, reserved: bool) -> bool {
    if host.slots_total < 2 || !host.shared_volume_capable {
        return false;
    }
    reserved || host.free_slots() >= 1
}

/// `true` when a re-selection at failover time came back weaker than the
/// strategy configured at registration. Recorded as an event annotation.
pub fn is_degraded(configured: Strategy, selected: Strategy) -> bool {
    configured == Strategy::WarmPool && selected != Strategy::WarmPool
}
