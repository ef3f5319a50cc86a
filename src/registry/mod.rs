//! Concurrent registry of protected instances, their host mirror, and the
//! per-instance recovery lease.
//!
//! All cross-task mutation of an instance or its associations goes through
//! this registry under short non-async critical sections. The lease table
//! serializes recovery workflows: a workflow must hold the instance's lease
//! before it may mutate the instance/association pair, and leases expire so
//! a crashed workflow never wedges an instance permanently.

pub mod error;
pub mod lease;


use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::model::{
    AssociationKind, FailoverPhase, FailoverPolicy, Host, HostId, Instance, InstanceId, SlotId,
    StandbyAssociation, Strategy, WarmPoolAssociation,
};

pub use error::{RegistryError, RegistryResult};
pub use lease::{LeaseTable, LeaseToken};

#[derive(Debug, Clone)]
struct InstanceEntry {
    instance: Instance,
    warm_pool: Option<WarmPoolAssociation>,
    standby: Option<StandbyAssociation>,
    retired: bool,
}

#[derive(Debug, Clone)]
struct HostEntry {
    host: Host,
    warm_pool_failures: u32,
}

/// Keyed map of everything the failover core owns per instance.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<HashMap<InstanceId, InstanceEntry>>,
    hosts: RwLock<HashMap<HostId, HostEntry>>,
    leases: LeaseTable,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance under protection and refreshes its host mirror.
    pub fn register(&self, instance: Instance, host: Host) -> RegistryResult<()> {
        if instance.host != host.id {
            return Err(RegistryError::HostMismatch {
                instance: instance.id.clone(),
                host: host.id,
            });
        }

        {
            let mut hosts = self.hosts.write();
            hosts
                .entry(host.id.clone())
                .and_modify(|entry| entry.host = host.clone())
                .or_insert(HostEntry {
                    host,
                    warm_pool_failures: 0,
                });
        }

        let mut instances = self.instances.write();
        match instances.get(&instance.id) {
            Some(entry) if !entry.retired => {
                Err(RegistryError::AlreadyRegistered(instance.id.clone()))
            }
            _ => {
                debug!(instance = %instance.id, host = %instance.host, "registered instance");
                instances.insert(
                    instance.id.clone(),
                    InstanceEntry {
                        instance,
                        warm_pool: None,
                        standby: None,
                        retired: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Tombstones an instance so late signals are ignored.
    ///
    /// Refused while a recovery lease is held: the in-flight workflow owns
    /// the instance until it finishes or its lease expires.
    pub fn decommission(&self, id: &InstanceId) -> RegistryResult<()> {
        if let Some(remaining_ms) = self.leases.held_for(id) {
            return Err(RegistryError::LeaseHeld {
                instance: id.clone(),
                remaining_ms,
            });
        }

        let mut instances = self.instances.write();
        let entry = instances
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownInstance(id.clone()))?;
        entry.retired = true;
        entry.warm_pool = None;
        entry.standby = None;
        entry.instance.active_association = None;
        debug!(instance = %id, "decommissioned instance");
        Ok(())
    }

    pub fn get(&self, id: &InstanceId) -> Option<Instance> {
        let instances = self.instances.read();
        instances
            .get(id)
            .filter(|e| !e.retired)
            .map(|e| e.instance.clone())
    }

    pub fn is_retired(&self, id: &InstanceId) -> bool {
        self.instances.read().get(id).is_some_and(|e| e.retired)
    }

    /// All live (non-retired) instances.
    pub fn list(&self) -> Vec<Instance> {
        self.instances
            .read()
            .values()
            .filter(|e| !e.retired)
            .map(|e| e.instance.clone())
            .collect()
    }

    pub fn host(&self, id: &HostId) -> Option<Host> {
        self.hosts.read().get(id).map(|e| e.host.clone())
    }

    /// The host mirror entry for an instance's host.
    pub fn host_for(&self, id: &InstanceId) -> Option<Host> {
        let host_id = self.get(id)?.host;
        self.host(&host_id)
    }

    pub fn update_host(&self, host: Host) {
        let mut hosts = self.hosts.write();
        hosts
            .entry(host.id.clone())
            .and_modify(|entry| entry.host = host.clone())
            .or_insert(HostEntry {
                host,
                warm_pool_failures: 0,
            });
    }

    /// Adjusts the mirrored slot occupancy after a reservation or release.
    pub fn adjust_host_occupancy(&self, id: &HostId, delta: i64) -> RegistryResult<()> {
        let mut hosts = self.hosts.write();
        let entry = hosts
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownHost(id.clone()))?;
        let used = i64::from(entry.host.slots_used) + delta;
        entry.host.slots_used = used.clamp(0, i64::from(entry.host.slots_total)) as u32;
        Ok(())
    }

    pub fn record_warm_pool_failure(&self, id: &HostId) {
        let mut hosts = self.hosts.write();
        if let Some(entry) = hosts.get_mut(id) {
            entry.warm_pool_failures += 1;
            warn!(host = %id, failures = entry.warm_pool_failures, "warm pool activation failure recorded against host");
        }
    }

    pub fn warm_pool_failures(&self, id: &HostId) -> u32 {
        self.hosts
            .read()
            .get(id)
            .map(|e| e.warm_pool_failures)
            .unwrap_or(0)
    }

    pub fn set_phase(&self, id: &InstanceId, phase: FailoverPhase) -> RegistryResult<()> {
        self.with_instance_mut(id, |instance| instance.phase = phase)
    }

    pub fn phase(&self, id: &InstanceId) -> Option<FailoverPhase> {
        self.get(id).map(|i| i.phase)
    }

    pub fn set_configured_strategy(
        &self,
        id: &InstanceId,
        strategy: Strategy,
    ) -> RegistryResult<()> {
        self.with_instance_mut(id, |instance| instance.configured_strategy = strategy)
    }

    pub fn set_policy(&self, id: &InstanceId, policy: FailoverPolicy) -> RegistryResult<()> {
        self.with_instance_mut(id, |instance| instance.policy = policy)
    }

    /// Points the instance at a replacement primary slot after restore.
    pub fn set_slot(&self, id: &InstanceId, slot: SlotId) -> RegistryResult<()> {
        self.with_instance_mut(id, |instance| instance.slot = slot)
    }

    /// Marks which association currently serves the instance.
    ///
    /// Switching directly between the two kinds is refused; the coordinator
    /// must pass through `None` first, which keeps the at-most-one-active
    /// invariant checkable at the point of mutation.
    pub fn set_active_association(
        &self,
        id: &InstanceId,
        kind: Option<AssociationKind>,
    ) -> RegistryResult<()> {
        let mut instances = self.instances.write();
        let entry = instances
            .get_mut(id)
            .filter(|e| !e.retired)
            .ok_or_else(|| RegistryError::UnknownInstance(id.clone()))?;

        if let (Some(current), Some(next)) = (entry.instance.active_association, kind)
            && current != next
        {
            return Err(RegistryError::AssociationConflict {
                instance: id.clone(),
                current,
            });
        }

        entry.instance.active_association = kind;
        Ok(())
    }

    pub fn warm_pool(&self, id: &InstanceId) -> Option<WarmPoolAssociation> {
        self.instances.read().get(id)?.warm_pool.clone()
    }

    pub fn set_warm_pool(
        &self,
        id: &InstanceId,
        association: Option<WarmPoolAssociation>,
    ) -> RegistryResult<()> {
        let mut instances = self.instances.write();
        let entry = instances
            .get_mut(id)
            .filter(|e| !e.retired)
            .ok_or_else(|| RegistryError::UnknownInstance(id.clone()))?;
        entry.warm_pool = association;
        Ok(())
    }

    pub fn standby(&self, id: &InstanceId) -> Option<StandbyAssociation> {
        self.instances.read().get(id)?.standby.clone()
    }

    pub fn set_standby(
        &self,
        id: &InstanceId,
        association: Option<StandbyAssociation>,
    ) -> RegistryResult<()> {
        let mut instances = self.instances.write();
        let entry = instances
            .get_mut(id)
            .filter(|e| !e.retired)
            .ok_or_else(|| RegistryError::UnknownInstance(id.clone()))?;
        entry.standby = association;
        Ok(())
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    fn with_instance_mut<F>(&self, id: &InstanceId, f: F) -> RegistryResult<()>
    where
        F: FnOnce(&mut Instance),
    {
        let mut instances = self.instances.write();
        let entry = instances
            .get_mut(id)
            .filter(|e| !e.retired)
            .ok_or_else(|| RegistryError::UnknownInstance(id.clone()))?;
        f(&mut entry.instance);
        Ok(())
    }
}
