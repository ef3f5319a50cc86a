//! Scriptable in-memory marketplace for tests.
//!
//! Keeps a call ledger, enforces exclusive volume attachment, and lets tests
//! script boot delays and per-operation failures.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{ProviderError, ProviderResult};
use super::{ComputeProvider, SlotStatus, SyncReport};
use crate::model::{HostId, InstanceId, SlotId, StandbyResourceRef, VolumeId};
use crate::snapshot::SnapshotMeta;

#[derive(Debug)]
struct SlotRecord {
    status: SlotStatus,
    /// Set while booting; the slot promotes itself to ready once reached.
    ready_at: Option<Instant>,
}

#[derive(Default)]
struct MockState {
    slots: HashMap<(HostId, SlotId), SlotRecord>,
    /// Current writable attachment of each volume, if any.
    attachments: HashMap<VolumeId, Option<(HostId, SlotId)>>,
    standbys: HashMap<InstanceId, StandbyResourceRef>,
    /// Content hash of the state currently on each standby resource.
    standby_state: HashMap<String, String>,
    /// Content hash of each instance's primary state.
    primary_state: HashMap<InstanceId, String>,
    calls: Vec<String>,
    fail: HashMap<String, u32>,
    next_id: u32,
}

pub struct MockComputeProvider {
    state: Mutex<MockState>,
    boot_delay: Mutex<Duration>,
    slot_boot_delays: Mutex<HashMap<SlotId, Duration>>,
}

impl Default for MockComputeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockComputeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            boot_delay: Mutex::new(Duration::ZERO),
            slot_boot_delays: Mutex::new(HashMap::new()),
        }
    }

    /// How long a started slot stays in `Booting` before reporting `Ready`.
    pub fn set_boot_delay(&self, delay: Duration) {
        *self.boot_delay.lock() = delay;
    }

    /// Overrides the boot delay for one slot; other slots keep the global
    /// delay.
    pub fn set_slot_boot_delay(&self, slot: &SlotId, delay: Duration) {
        self.slot_boot_delays.lock().insert(slot.clone(), delay);
    }

    /// Makes the next `times` calls of `op` fail (`u32::MAX` for always).
    pub fn fail_op(&self, op: &str, times: u32) {
        self.state.lock().fail.insert(op.to_string(), times);
    }

    /// Registers a pre-existing slot, e.g. the one a primary occupies.
    pub fn seed_slot(&self, host: &HostId, slot: &SlotId, status: SlotStatus) {
        self.state.lock().slots.insert(
            (host.clone(), slot.clone()),
            SlotRecord {
                status,
                ready_at: None,
            },
        );
    }

    /// Sets the primary state of an instance; the hash is derived from the
    /// payload the same way the snapshot store derives it.
    pub fn set_primary_state(&self, instance: &InstanceId, payload: &[u8]) {
        self.state.lock().primary_state.insert(
            instance.clone(),
            blake3::hash(payload).to_hex().to_string(),
        );
    }

    pub fn standby_state_hash(&self, resource_id: &str) -> Option<String> {
        self.state.lock().standby_state.get(resource_id).cloned()
    }

    pub fn primary_state_hash(&self, instance: &InstanceId) -> Option<String> {
        self.state.lock().primary_state.get(instance).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(op))
            .count()
    }

    fn record(&self, op: &str, detail: &str) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("{op} {detail}"));
        if let Some(remaining) = state.fail.get_mut(op) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(ProviderError::Api {
                    op: op.to_string(),
                    message: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }
}

#[async_trait]
impl ComputeProvider for MockComputeProvider {
    async fn reserve_slot(&self, host: &HostId) -> ProviderResult<SlotId> {
        self.record("reserve_slot", host.as_str())?;
        let slot = SlotId::new(self.fresh_id("slot"));
        self.state.lock().slots.insert(
            (host.clone(), slot.clone()),
            SlotRecord {
                status: SlotStatus::Stopped,
                ready_at: None,
            },
        );
        Ok(slot)
    }

    async fn release_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()> {
        self.record("release_slot", slot.as_str())?;
        self.state
            .lock()
            .slots
            .remove(&(host.clone(), slot.clone()));
        Ok(())
    }

    async fn create_shared_volume(&self, host: &HostId, size_gb: u64) -> ProviderResult<VolumeId> {
        self.record("create_shared_volume", &format!("{host} {size_gb}gb"))?;
        let volume = VolumeId::new(self.fresh_id("vol"));
        self.state.lock().attachments.insert(volume.clone(), None);
        Ok(volume)
    }

    async fn delete_volume(&self, _host: &HostId, volume: &VolumeId) -> ProviderResult<()> {
        self.record("delete_volume", volume.as_str())?;
        self.state.lock().attachments.remove(volume);
        Ok(())
    }

    async fn attach_volume(
        &self,
        host: &HostId,
        volume: &VolumeId,
        slot: &SlotId,
    ) -> ProviderResult<()> {
        self.record("attach_volume", &format!("{volume} -> {slot}"))?;
        let mut state = self.state.lock();
        match state.attachments.get_mut(volume) {
            Some(attachment) => match attachment {
                Some((_, attached)) if attached != slot => {
                    Err(ProviderError::VolumeBusy(volume.clone()))
                }
                _ => {
                    *attachment = Some((host.clone(), slot.clone()));
                    Ok(())
                }
            },
            None => Err(ProviderError::Api {
                op: "attach_volume".to_string(),
                message: format!("unknown volume {volume}"),
            }),
        }
    }

    async fn detach_volume(
        &self,
        _host: &HostId,
        volume: &VolumeId,
        slot: &SlotId,
    ) -> ProviderResult<()> {
        self.record("detach_volume", &format!("{volume} <- {slot}"))?;
        let mut state = self.state.lock();
        if let Some(attachment) = state.attachments.get_mut(volume) {
            if attachment.as_ref().is_some_and(|(_, s)| s == slot) {
                *attachment = None;
            }
        }
        Ok(())
    }

    async fn start_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()> {
        self.record("start_slot", slot.as_str())?;
        let boot_delay = self
            .slot_boot_delays
            .lock()
            .get(slot)
            .copied()
            .unwrap_or_else(|| *self.boot_delay.lock());
        let mut state = self.state.lock();
        let record = state
            .slots
            .get_mut(&(host.clone(), slot.clone()))
            .ok_or_else(|| ProviderError::UnknownSlot {
                host: host.clone(),
                slot: slot.clone(),
            })?;
        record.status = SlotStatus::Booting;
        record.ready_at = Some(Instant::now() + boot_delay);
        Ok(())
    }

    async fn stop_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()> {
        self.record("stop_slot", slot.as_str())?;
        if let Some(record) = self
            .state
            .lock()
            .slots
            .get_mut(&(host.clone(), slot.clone()))
        {
            record.status = SlotStatus::Stopped;
            record.ready_at = None;
        }
        Ok(())
    }

    async fn slot_status(&self, host: &HostId, slot: &SlotId) -> ProviderResult<SlotStatus> {
        self.record("slot_status", slot.as_str())?;
        let mut state = self.state.lock();
        let record = state
            .slots
            .get_mut(&(host.clone(), slot.clone()))
            .ok_or_else(|| ProviderError::UnknownSlot {
                host: host.clone(),
                slot: slot.clone(),
            })?;
        if record.status == SlotStatus::Booting
            && record.ready_at.is_some_and(|at| Instant::now() >= at)
        {
            record.status = SlotStatus::Ready;
            record.ready_at = None;
        }
        Ok(record.status)
    }

    async fn slot_endpoint(&self, host: &HostId, slot: &SlotId) -> ProviderResult<String> {
        self.record("slot_endpoint", slot.as_str())?;
        Ok(format!("gpu://{host}/{slot}"))
    }

    async fn provision_standby(
        &self,
        instance: &InstanceId,
        zone: &str,
        class: &str,
    ) -> ProviderResult<StandbyResourceRef> {
        self.record("provision_standby", instance.as_str())?;
        let mut state = self.state.lock();
        if let Some(existing) = state.standbys.get(instance) {
            return Ok(existing.clone());
        }
        state.next_id += 1;
        let resource = StandbyResourceRef {
            provider: "mock".to_string(),
            zone: zone.to_string(),
            class: class.to_string(),
            resource_id: format!("sb-{}", state.next_id),
        };
        state.standbys.insert(instance.clone(), resource.clone());
        Ok(resource)
    }

    async fn teardown_standby(&self, resource: &StandbyResourceRef) -> ProviderResult<()> {
        self.record("teardown_standby", &resource.resource_id)?;
        let mut state = self.state.lock();
        state.standbys.retain(|_, r| r.resource_id != resource.resource_id);
        state.standby_state.remove(&resource.resource_id);
        Ok(())
    }

    async fn sync_to_standby(
        &self,
        instance: &InstanceId,
        resource: &StandbyResourceRef,
    ) -> ProviderResult<SyncReport> {
        self.record("sync_to_standby", &resource.resource_id)?;
        let mut state = self.state.lock();
        let hash = state
            .primary_state
            .get(instance)
            .cloned()
            .unwrap_or_else(|| blake3::hash(b"").to_hex().to_string());
        state
            .standby_state
            .insert(resource.resource_id.clone(), hash.clone());
        Ok(SyncReport {
            bytes: 1024,
            content_hash: hash,
        })
    }

    async fn sync_from_standby(
        &self,
        resource: &StandbyResourceRef,
        instance: &InstanceId,
    ) -> ProviderResult<SyncReport> {
        self.record("sync_from_standby", &resource.resource_id)?;
        let mut state = self.state.lock();
        let hash = state
            .standby_state
            .get(&resource.resource_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownStandby(instance.clone()))?;
        state.primary_state.insert(instance.clone(), hash.clone());
        Ok(SyncReport {
            bytes: 1024,
            content_hash: hash,
        })
    }

    async fn restore_snapshot(
        &self,
        resource: &StandbyResourceRef,
        snapshot: &SnapshotMeta,
    ) -> ProviderResult<SyncReport> {
        self.record("restore_snapshot", &snapshot.id.to_string())?;
        self.state.lock().standby_state.insert(
            resource.resource_id.clone(),
            snapshot.content_hash.clone(),
        );
        Ok(SyncReport {
            bytes: snapshot.size_bytes,
            content_hash: snapshot.content_hash.clone(),
        })
    }

    async fn start_services(&self, resource: &StandbyResourceRef) -> ProviderResult<String> {
        self.record("start_services", &resource.resource_id)?;
        Ok(format!("standby://{}", resource.resource_id))
    }
}
