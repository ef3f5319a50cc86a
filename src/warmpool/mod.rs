//! Warm-pool failover: a reserved standby slot on the primary's own host.
//!
//! The standby shares the primary's persistent volume, so activation is
//! bounded by compute-boot time alone and never touches the snapshot store.
//! The manager, not the coordinator, owns the exclusive-mount handoff of the
//! shared volume.

pub mod config;
pub mod error;


pub use config::WarmPoolConfig;
pub use error::{WarmPoolError, WarmPoolResult};

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::model::{InstanceId, WarmPoolAssociation, WarmPoolState};
use crate::provider::{ComputeProvider, SlotStatus};
use crate::registry::InstanceRegistry;

pub struct WarmPoolManager {
    provider: Arc<dyn ComputeProvider>,
    registry: Arc<InstanceRegistry>,
    config: WarmPoolConfig,
}

impl WarmPoolManager {
    pub fn new(
        provider: Arc<dyn ComputeProvider>,
        registry: Arc<InstanceRegistry>,
        config: WarmPoolConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    /// Reserves a standby slot next to the primary and creates the shared
    /// volume both slots reference. Idempotent: an existing association is
    /// returned as-is.
    #[instrument(skip(self))]
    pub async fn provision(&self, instance: &InstanceId) -> WarmPoolResult<WarmPoolAssociation> {
        if let Some(existing) = self.registry.warm_pool(instance) {
            return Ok(existing);
        }

        let record = self
            .registry
            .get(instance)
            .ok_or_else(|| WarmPoolError::UnknownInstance(instance.clone()))?;
        let host = self
            .registry
            .host(&record.host)
            .ok_or_else(|| WarmPoolError::UnknownInstance(instance.clone()))?;

        if host.slots_total < 2 {
            return Err(WarmPoolError::HostUnsuitable {
                host: host.id,
                reason: "host has a single compute slot".to_string(),
            });
        }
        if !host.shared_volume_capable {
            return Err(WarmPoolError::HostUnsuitable {
                host: host.id,
                reason: "host cannot share a volume across slots".to_string(),
            });
        }
        if host.free_slots() == 0 {
            return Err(WarmPoolError::HostUnsuitable {
                host: host.id,
                reason: "no free slot to reserve".to_string(),
            });
        }

        let standby_slot = self.provider.reserve_slot(&record.host).await?;
        let shared_volume = self
            .provider
            .create_shared_volume(&record.host, record.spec.volume_gb)
            .await?;
        // Both slots reference the volume, but it is writable on exactly
        // one; it starts on the primary and moves only during handoff.
        self.provider
            .attach_volume(&record.host, &shared_volume, &record.slot)
            .await?;
        self.registry.adjust_host_occupancy(&record.host, 1)?;

        let association = WarmPoolAssociation {
            primary: instance.clone(),
            host: record.host.clone(),
            primary_slot: record.slot.clone(),
            standby_slot,
            shared_volume,
            state: WarmPoolState::Ready,
        };
        self.registry
            .set_warm_pool(instance, Some(association.clone()))?;
        info!(instance = %instance, host = %record.host, "warm pool provisioned");
        Ok(association)
    }

    /// Starts the standby slot and hands the shared volume over to it.
    ///
    /// Bounded by the configured hard timeout; on expiry the slot is stopped
    /// best-effort, the failure is recorded against the host, and the caller
    /// is expected to fall back rather than retry.
    #[instrument(skip(self))]
    pub async fn activate(&self, instance: &InstanceId) -> WarmPoolResult<String> {
        let mut association = self
            .registry
            .warm_pool(instance)
            .ok_or_else(|| WarmPoolError::NotProvisioned(instance.clone()))?;

        association.state = WarmPoolState::Activating;
        self.registry
            .set_warm_pool(instance, Some(association.clone()))?;

        let boot = self.boot_standby(&association);
        match tokio::time::timeout(self.config.activation_timeout, boot).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.record_activation_failure(&association).await;
                return Err(e);
            }
            Err(_) => {
                self.record_activation_failure(&association).await;
                return Err(WarmPoolError::ActivationTimeout(
                    self.config.activation_timeout,
                ));
            }
        }

        // Exclusive-mount handoff: detach before attach, never both mounted.
        self.provider
            .detach_volume(
                &association.host,
                &association.shared_volume,
                &association.primary_slot,
            )
            .await?;
        self.provider
            .attach_volume(
                &association.host,
                &association.shared_volume,
                &association.standby_slot,
            )
            .await?;

        association.state = WarmPoolState::Active;
        self.registry
            .set_warm_pool(instance, Some(association.clone()))?;

        let endpoint = self
            .provider
            .slot_endpoint(&association.host, &association.standby_slot)
            .await?;
        info!(instance = %instance, endpoint = %endpoint, "warm pool standby active");
        Ok(endpoint)
    }

    /// Returns the association to ready.
    ///
    /// After a completed failover (`Active`) the old primary slot is the
    /// idle one and roles swap; during a cancelled activation the standby
    /// is rolled back and the volume returns to the primary unswapped.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, instance: &InstanceId) -> WarmPoolResult<()> {
        let association = self
            .registry
            .warm_pool(instance)
            .ok_or_else(|| WarmPoolError::NotProvisioned(instance.clone()))?;

        let rearmed = match association.state {
            WarmPoolState::Ready => return Ok(()),
            WarmPoolState::Active => {
                self.provider
                    .stop_slot(&association.host, &association.primary_slot)
                    .await?;
                WarmPoolAssociation {
                    primary_slot: association.standby_slot.clone(),
                    standby_slot: association.primary_slot.clone(),
                    state: WarmPoolState::Ready,
                    ..association
                }
            }
            WarmPoolState::Activating => {
                self.provider
                    .stop_slot(&association.host, &association.standby_slot)
                    .await?;
                // The volume may already have left the primary; make sure
                // it is writable there again.
                self.provider
                    .detach_volume(
                        &association.host,
                        &association.shared_volume,
                        &association.standby_slot,
                    )
                    .await?;
                self.provider
                    .attach_volume(
                        &association.host,
                        &association.shared_volume,
                        &association.primary_slot,
                    )
                    .await?;
                WarmPoolAssociation {
                    state: WarmPoolState::Ready,
                    ..association
                }
            }
        };

        self.registry.set_warm_pool(instance, Some(rearmed))?;
        info!(instance = %instance, "warm pool returned to ready");
        Ok(())
    }

    /// Releases the reserved slot and shared volume.
    #[instrument(skip(self))]
    pub async fn deprovision(&self, instance: &InstanceId) -> WarmPoolResult<()> {
        let Some(association) = self.registry.warm_pool(instance) else {
            return Ok(());
        };

        self.provider
            .release_slot(&association.host, &association.standby_slot)
            .await?;
        self.provider
            .delete_volume(&association.host, &association.shared_volume)
            .await?;
        self.registry.adjust_host_occupancy(&association.host, -1)?;
        self.registry.set_warm_pool(instance, None)?;
        info!(instance = %instance, "warm pool deprovisioned");
        Ok(())
    }

    pub fn status(&self, instance: &InstanceId) -> Option<WarmPoolState> {
        self.registry.warm_pool(instance).map(|a| a.state)
    }

    async fn boot_standby(&self, association: &WarmPoolAssociation) -> WarmPoolResult<()> {
        self.provider
            .start_slot(&association.host, &association.standby_slot)
            .await?;
        loop {
            let status = self
                .provider
                .slot_status(&association.host, &association.standby_slot)
                .await?;
            if status == SlotStatus::Ready {
                return Ok(());
            }
            tokio::time::sleep(self.config.boot_poll_interval).await;
        }
    }

    async fn record_activation_failure(&self, association: &WarmPoolAssociation) {
        warn!(
            instance = %association.primary,
            host = %association.host,
            "warm pool activation failed; stopping standby slot"
        );
        self.registry.record_warm_pool_failure(&association.host);
        if let Err(e) = self
            .provider
            .stop_slot(&association.host, &association.standby_slot)
            .await
        {
            warn!(error = %e, "failed to stop standby slot after activation failure");
        }
        let rolled_back = WarmPoolAssociation {
            state: WarmPoolState::Ready,
            ..association.clone()
        };
        let _ = self
            .registry
            .set_warm_pool(&association.primary, Some(rolled_back));
    }
}
