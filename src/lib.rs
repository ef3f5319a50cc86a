//! Lifeline library crate (used by the server binary and integration tests).
//!
//! Lifeline keeps workloads on interruptible GPU instances available: it
//! probes primaries for liveness, decides between a warm pool slot and an
//! external CPU standby when one degrades, drives the recovery workflow end
//! to end, and restores the primary role once capacity returns.
//!
//! # Public API Surface
//!
//! ## Core Types
//! - [`Config`], [`ConfigError`] - Server configuration
//! - [`Instance`], [`Host`], [`FailoverPhase`], [`Strategy`] - Domain records
//! - [`InstanceRegistry`] - Authoritative instance/host state plus leases
//! - [`FailoverLog`], [`FailoverEvent`] - Per-incident audit trail
//!
//! ## Recovery
//! - [`Coordinator`], [`Signal`] - Signal dispatch and workflow execution
//! - [`WarmPoolManager`] - Reserved same-host slot, volume handoff
//! - [`StandbyManager`] - External CPU standby, incremental sync
//! - [`HeartbeatMonitor`] - Liveness probing and degradation detection
//!
//! ## Edges
//! - [`ComputeProvider`] - Marketplace provisioning operations
//! - [`SnapshotStore`] - Snapshot create/fetch
//! - [`Notifier`] - Signed fire-and-forget webhook delivery
//! - [`RecoveryReporter`] - MTTR/MTBF aggregation and failover simulation
//!
//! ## Test/Mock Support
//! Mock implementations of every edge are available behind
//! `#[cfg(any(test, feature = "mock"))]`.

pub mod config;
pub mod coordinator;
pub mod events;
pub mod gateway;
pub mod heartbeat;
pub mod model;
pub mod notify;
pub mod provider;
pub mod registry;
pub mod report;
pub mod snapshot;
pub mod standby;
pub mod strategy;
pub mod warmpool;

pub use config::{Config, ConfigError};
pub use coordinator::{Coordinator, CoordinatorConfig, Signal};
pub use events::{FailoverEvent, FailoverLog, FailoverOutcome};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, HttpProbe, Probe, ProbeOutcome};
pub use model::{
    AssociationKind, FailoverPhase, FailoverPolicy, Host, HostId, Instance, InstanceId,
    ResourceSpec, SlotId, Strategy, VolumeId,
};
pub use notify::{Notification, Notifier, NotifierHandle, NotifyConfig};
pub use provider::{ComputeProvider, MarketplaceClient};
pub use registry::{InstanceRegistry, RegistryError};
pub use report::{RecoveryReport, RecoveryReporter};
pub use snapshot::{HttpSnapshotStore, SnapshotMeta, SnapshotStore};
pub use standby::{StandbyConfig, StandbyManager};
pub use warmpool::{WarmPoolConfig, WarmPoolManager};

#[cfg(any(test, feature = "mock"))]
pub use heartbeat::MockProbe;
#[cfg(any(test, feature = "mock"))]
pub use notify::MockDeliveryTransport;
#[cfg(any(test, feature = "mock"))]
pub use provider::MockComputeProvider;
#[cfg(any(test, feature = "mock"))]
pub use snapshot::MockSnapshotStore;
