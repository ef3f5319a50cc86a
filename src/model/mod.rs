//! Core domain records shared across the crate.
//!
//! Everything a recovery workflow touches is described here: protected
//! [`Instance`]s, the [`Host`] mirror, the two association records binding a
//! primary to its standby counterpart, and the [`FailoverPhase`] state enum
//! the coordinator walks. Associations own the primary↔standby relationship;
//! an instance only carries a lookup-only [`AssociationKind`] tag pointing at
//! whichever association is currently active.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace identifier of a rented compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Physical host identifier as reported by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Compute slot identifier on a host (one GPU bundle the marketplace can
/// start and stop independently).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent volume identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource shape of a rented instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// GPU model string as listed on the marketplace (e.g. `RTX 4090`).
    pub gpu_model: String,
    /// Number of GPUs in the bundle.
    pub gpu_count: u32,
    /// Attached volume size in gigabytes.
    pub volume_gb: u64,
}

/// Recovery strategy chosen for an instance.
///
/// `WarmPool` swaps to a reserved slot on the same host and never moves data;
/// `CpuStandby` migrates to an external low-cost resource and is
/// transfer-bound; `None` means the instance is monitored but not protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    WarmPool,
    CpuStandby,
    None,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::WarmPool => "warm_pool",
            Strategy::CpuStandby => "cpu_standby",
            Strategy::None => "none",
        }
    }

    /// The strategy tried when this one fails activation.
    pub fn alternate(&self) -> Strategy {
        match self {
            Strategy::WarmPool => Strategy::CpuStandby,
            Strategy::CpuStandby => Strategy::WarmPool,
            Strategy::None => Strategy::None,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-instance protection switches set through the management surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverPolicy {
    pub warm_pool_enabled: bool,
    pub standby_enabled: bool,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            warm_pool_enabled: true,
            standby_enabled: true,
        }
    }
}

impl FailoverPolicy {
    pub fn disabled() -> Self {
        Self {
            warm_pool_enabled: false,
            standby_enabled: false,
        }
    }
}

/// Recovery lifecycle state of an instance.
///
/// The coordinator walks the nominal loop
/// `Healthy → Degraded → StrategySelected → Activating → ActiveOnStandby →
/// SyncingBack → RestoringPrimary → Healthy`, with `ActivationFailed` as the
/// detour taken when an activation attempt times out and `Failed` as the
/// terminal state once every strategy is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPhase {
    Healthy,
    Degraded,
    StrategySelected,
    Activating,
    ActiveOnStandby,
    SyncingBack,
    RestoringPrimary,
    ActivationFailed,
    Failed,
}

impl FailoverPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverPhase::Healthy => "healthy",
            FailoverPhase::Degraded => "degraded",
            FailoverPhase::StrategySelected => "strategy_selected",
            FailoverPhase::Activating => "activating",
            FailoverPhase::ActiveOnStandby => "active_on_standby",
            FailoverPhase::SyncingBack => "syncing_back",
            FailoverPhase::RestoringPrimary => "restoring_primary",
            FailoverPhase::ActivationFailed => "activation_failed",
            FailoverPhase::Failed => "failed",
        }
    }

    /// Terminal states end the workflow; no further transitions are legal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FailoverPhase::Failed)
    }

    /// `true` while a recovery workflow owns the instance (lease held).
    pub fn is_recovering(&self) -> bool {
        !matches!(self, FailoverPhase::Healthy | FailoverPhase::Failed)
    }
}

impl std::fmt::Display for FailoverPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which association is currently serving the instance, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    WarmPool,
    Standby,
}

/// A protected compute instance.
///
/// Created at registration (provisioning time), mutated only by the
/// coordinator and the managers through the registry, removed at
/// decommission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub host: HostId,
    /// Compute slot the workload currently occupies.
    pub slot: SlotId,
    pub spec: ResourceSpec,
    pub policy: FailoverPolicy,
    /// Strategy chosen at provisioning time. Re-evaluated at failover time;
    /// the two may legitimately disagree when host capacity changed.
    pub configured_strategy: Strategy,
    pub phase: FailoverPhase,
    /// Lookup-only back-reference to the active association.
    pub active_association: Option<AssociationKind>,
}

impl Instance {
    /// A freshly registered instance: healthy, no association yet.
    pub fn new(
        id: InstanceId,
        host: HostId,
        slot: SlotId,
        spec: ResourceSpec,
        policy: FailoverPolicy,
    ) -> Self {
        Self {
            id,
            host,
            slot,
            spec,
            policy,
            configured_strategy: Strategy::None,
            phase: FailoverPhase::Healthy,
            active_association: None,
        }
    }
}

/// Mirror of a marketplace host.
///
/// The provisioning collaborator owns this data; the core only reads it (the
/// registry refreshes the mirror from registration payloads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub region: String,
    pub slots_total: u32,
    pub slots_used: u32,
    /// Whether the host can attach one volume to two slots at once.
    pub shared_volume_capable: bool,
}

impl Host {
    pub fn free_slots(&self) -> u32 {
        self.slots_total.saturating_sub(self.slots_used)
    }
}

/// Warm-pool association state.
///
/// Transitions are monotonic (`Ready → Activating → Active`) except the
/// explicit return-to-normal performed by `deactivate`, which re-arms the
/// association back to `Ready` with roles swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmPoolState {
    Ready,
    Activating,
    Active,
}

impl WarmPoolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmPoolState::Ready => "ready",
            WarmPoolState::Activating => "activating",
            WarmPoolState::Active => "active",
        }
    }
}

/// Binds a primary instance to its reserved standby slot on the same host.
///
/// Both slots reference the single shared volume; the warm-pool manager
/// guarantees the volume is mounted writable on exactly one of them at any
/// moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmPoolAssociation {
    pub primary: InstanceId,
    pub host: HostId,
    /// Slot currently serving traffic.
    pub primary_slot: SlotId,
    /// Reserved idle slot, started only on failover.
    pub standby_slot: SlotId,
    pub shared_volume: VolumeId,
    pub state: WarmPoolState,
}

/// Freshness of the standby's copy of primary state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Provisioned, nothing pushed yet.
    Pending,
    /// Last incremental push completed inside the sync interval.
    Fresh,
    /// Last push is older than the sync interval.
    Stale,
    /// The last push failed after exhausting retries.
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Fresh => "fresh",
            SyncState::Stale => "stale",
            SyncState::Failed => "failed",
        }
    }
}

/// Location of an external low-cost fallback resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandbyResourceRef {
    /// Cloud or marketplace provider the resource lives on.
    pub provider: String,
    pub zone: String,
    /// Machine class (e.g. `cpu-8-32`).
    pub class: String,
    pub resource_id: String,
}

/// Binds a primary instance to its external fallback resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandbyAssociation {
    pub primary: InstanceId,
    pub resource: StandbyResourceRef,
    pub sync_state: SyncState,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl StandbyAssociation {
    /// Age of the last completed sync, if any.
    pub fn sync_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_synced_at.map(|t| now.signed_duration_since(t))
    }
}
