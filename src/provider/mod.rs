//! Marketplace compute provisioning collaborator.
//!
//! Everything that starts, stops or moves raw compute and data lives behind
//! [`ComputeProvider`]. The managers own all calls into it and translate its
//! errors into coordinator signals; provider errors never reach the state
//! machine directly.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{ProviderError, ProviderResult};
pub use http::MarketplaceClient;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockComputeProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{HostId, InstanceId, SlotId, StandbyResourceRef, VolumeId};
use crate::snapshot::SnapshotMeta;

/// Lifecycle state of a compute slot as reported by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Stopped,
    Booting,
    Ready,
}

/// Outcome of a state transfer (sync or snapshot restore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub bytes: u64,
    /// Hash of the transferred state, for end-to-end integrity checks.
    pub content_hash: String,
}

/// Operations the failover core needs from the marketplace API.
///
/// Volume attachment is exclusive-writable: attaching a volume that is
/// attached elsewhere fails, which is what lets the warm-pool manager prove
/// single-owner handoff by detach-then-attach ordering.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn reserve_slot(&self, host: &HostId) -> ProviderResult<SlotId>;
    async fn release_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()>;

    async fn create_shared_volume(&self, host: &HostId, size_gb: u64) -> ProviderResult<VolumeId>;
    async fn delete_volume(&self, host: &HostId, volume: &VolumeId) -> ProviderResult<()>;
    async fn attach_volume(
        &self,
        host: &HostId,
        volume: &VolumeId,
        slot: &SlotId,
    ) -> ProviderResult<()>;
    async fn detach_volume(
        &self,
        host: &HostId,
        volume: &VolumeId,
        slot: &SlotId,
    ) -> ProviderResult<()>;

    async fn start_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()>;
    async fn stop_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()>;
    async fn slot_status(&self, host: &HostId, slot: &SlotId) -> ProviderResult<SlotStatus>;
    async fn slot_endpoint(&self, host: &HostId, slot: &SlotId) -> ProviderResult<String>;

    /// Creates (or returns) a low-cost external fallback resource.
    async fn provision_standby(
        &self,
        instance: &InstanceId,
        zone: &str,
        class: &str,
    ) -> ProviderResult<StandbyResourceRef>;
    async fn teardown_standby(&self, resource: &StandbyResourceRef) -> ProviderResult<()>;

    /// Pushes an incremental copy of primary state to the standby resource.
    async fn sync_to_standby(
        &self,
        instance: &InstanceId,
        resource: &StandbyResourceRef,
    ) -> ProviderResult<SyncReport>;

    /// Reverse direction: copies writes made on the standby back to the
    /// instance's (new) primary slot.
    async fn sync_from_standby(
        &self,
        resource: &StandbyResourceRef,
        instance: &InstanceId,
    ) -> ProviderResult<SyncReport>;

    /// Hydrates the standby resource from a stored snapshot.
    async fn restore_snapshot(
        &self,
        resource: &StandbyResourceRef,
        snapshot: &SnapshotMeta,
    ) -> ProviderResult<SyncReport>;

    /// Starts the workload services on the standby; returns its endpoint.
    async fn start_services(&self, resource: &StandbyResourceRef) -> ProviderResult<String>;
}
