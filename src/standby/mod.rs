//! External low-cost fallback: provisioning, periodic sync and
//! transfer-bound activation.
//!
//! While the primary is healthy a background task pushes incremental state
//! to the standby resource, so activation starts from a near-current copy
//! instead of the last cold snapshot. When live sync is stale or absent,
//! activation falls back to the snapshot store.

pub mod config;
pub mod error;


pub use config::StandbyConfig;
pub use error::{StandbyError, StandbyResult};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::model::{
    FailoverPhase, InstanceId, StandbyAssociation, SyncState,
};
use crate::provider::{ComputeProvider, SlotStatus, SyncReport};
use crate::registry::InstanceRegistry;
use crate::snapshot::SnapshotStore;

/// Where the standby's state came from at activation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    /// The live incremental sync was fresh enough to use as-is.
    Live,
    /// Live sync was stale or absent; state was pulled from the snapshot
    /// store.
    Snapshot,
}

impl SyncSource {
    pub fn annotation(&self) -> &'static str {
        match self {
            SyncSource::Live => "sync_source:live",
            SyncSource::Snapshot => "sync_source:snapshot",
        }
    }
}

/// Result of a completed standby activation.
#[derive(Debug, Clone)]
pub struct StandbyActivation {
    pub endpoint: String,
    pub sync_source: SyncSource,
    /// Hash of the state the standby is serving from.
    pub content_hash: Option<String>,
}

pub struct StandbyManager {
    provider: Arc<dyn ComputeProvider>,
    snapshots: Arc<dyn SnapshotStore>,
    registry: Arc<InstanceRegistry>,
    config: StandbyConfig,
    sync_tasks: Mutex<HashMap<InstanceId, JoinHandle<()>>>,
}

impl StandbyManager {
    pub fn new(
        provider: Arc<dyn ComputeProvider>,
        snapshots: Arc<dyn SnapshotStore>,
        registry: Arc<InstanceRegistry>,
        config: StandbyConfig,
    ) -> Self {
        Self {
            provider,
            snapshots,
            registry,
            config,
            sync_tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotently creates the external fallback resource for an instance.
    #[instrument(skip(self))]
    pub async fn ensure_provisioned(
        &self,
        instance: &InstanceId,
    ) -> StandbyResult<StandbyAssociation> {
        if let Some(existing) = self.registry.standby(instance) {
            return Ok(existing);
        }
        if self.registry.get(instance).is_none() {
            return Err(StandbyError::UnknownInstance(instance.clone()));
        }

        let mut last_error = String::new();
        for attempt in 1..=self.config.provision_retries {
            match self
                .provider
                .provision_standby(instance, &self.config.zone, &self.config.class)
                .await
            {
                Ok(resource) => {
                    let association = StandbyAssociation {
                        primary: instance.clone(),
                        resource,
                        sync_state: SyncState::Pending,
                        last_synced_at: None,
                    };
                    self.registry
                        .set_standby(instance, Some(association.clone()))?;
                    info!(instance = %instance, resource = %association.resource.resource_id, "standby provisioned");
                    return Ok(association);
                }
                Err(e) => {
                    warn!(instance = %instance, attempt, error = %e, "standby provisioning attempt failed");
                    last_error = e.to_string();
                    if attempt < self.config.provision_retries {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }
        Err(StandbyError::ProvisioningFailed {
            attempts: self.config.provision_retries,
            last_error,
        })
    }

    /// Runs one incremental push of primary state to the standby, retrying
    /// up to the transfer cap.
    #[instrument(skip(self))]
    pub async fn sync_once(&self, instance: &InstanceId) -> StandbyResult<SyncReport> {
        let association = self
            .registry
            .standby(instance)
            .ok_or_else(|| StandbyError::NotProvisioned(instance.clone()))?;

        match self
            .with_transfer_retries("sync_to_standby", || {
                self.provider.sync_to_standby(instance, &association.resource)
            })
            .await
        {
            Ok(report) => {
                self.update_sync_state(instance, SyncState::Fresh, Some(Utc::now()))?;
                debug!(instance = %instance, bytes = report.bytes, "incremental sync complete");
                Ok(report)
            }
            Err(e) => {
                self.update_sync_state(instance, SyncState::Failed, None)?;
                Err(e)
            }
        }
    }

    /// Starts the periodic sync task for an instance (no-op if running).
    ///
    /// The task only syncs while the instance is healthy; during a recovery
    /// workflow the activation path owns all transfers.
    pub fn start_sync(self: &Arc<Self>, instance: InstanceId) {
        let mut tasks = self.sync_tasks.lock();
        if tasks.contains_key(&instance) {
            return;
        }

        let manager = Arc::clone(self);
        let id = instance.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.sync_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if manager.registry.is_retired(&id) {
                    break;
                }
                if manager.registry.phase(&id) != Some(FailoverPhase::Healthy) {
                    manager.demote_stale(&id);
                    continue;
                }
                if let Err(e) = manager.sync_once(&id).await {
                    warn!(instance = %id, error = %e, "periodic standby sync failed");
                }
            }
        });
        tasks.insert(instance, handle);
    }

    pub fn stop_sync(&self, instance: &InstanceId) {
        if let Some(handle) = self.sync_tasks.lock().remove(instance) {
            handle.abort();
        }
    }

    pub fn stop_all_sync(&self) {
        let mut tasks = self.sync_tasks.lock();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }

    pub fn is_syncing(&self, instance: &InstanceId) -> bool {
        self.sync_tasks.lock().contains_key(instance)
    }

    /// Demotes a `Fresh` association whose last push has outlived the sync
    /// interval. Runs on ticks that skip syncing, so a paused loop cannot
    /// leave activation looking at a frozen `Fresh`.
    fn demote_stale(&self, instance: &InstanceId) {
        let Some(association) = self.registry.standby(instance) else {
            return;
        };
        if association.sync_state != SyncState::Fresh {
            return;
        }
        let max_age = chrono::Duration::from_std(self.config.sync_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        if association
            .sync_age(Utc::now())
            .is_some_and(|age| age > max_age)
            && let Err(e) = self.update_sync_state(instance, SyncState::Stale, None)
        {
            warn!(instance = %instance, error = %e, "could not mark standby sync stale");
        }
    }

    /// Brings the standby online from the freshest state available.
    ///
    /// Live-synced state is used when the last push completed within one
    /// sync interval of failure detection; otherwise the latest snapshot is
    /// fetched and restored. The whole operation is bounded by the
    /// activation budget.
    #[instrument(skip(self))]
    pub async fn activate(
        &self,
        instance: &InstanceId,
        detected_at: DateTime<Utc>,
    ) -> StandbyResult<StandbyActivation> {
        let association = self
            .registry
            .standby(instance)
            .ok_or_else(|| StandbyError::NotProvisioned(instance.clone()))?;

        let work = self.bring_online(instance, &association, detected_at);
        match tokio::time::timeout(self.config.activation_budget, work).await {
            Ok(result) => result,
            Err(_) => Err(StandbyError::ActivationTimeout(self.config.activation_budget)),
        }
    }

    async fn bring_online(
        &self,
        instance: &InstanceId,
        association: &StandbyAssociation,
        detected_at: DateTime<Utc>,
    ) -> StandbyResult<StandbyActivation> {
        let max_age = chrono::Duration::from_std(self.config.sync_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let live_is_fresh = association.sync_state == SyncState::Fresh
            && association
                .sync_age(detected_at)
                .is_some_and(|age| age <= max_age);

        let (sync_source, content_hash) = if live_is_fresh {
            (SyncSource::Live, None)
        } else {
            let meta = self
                .with_transfer_retries("fetch_latest", || self.snapshots.fetch_latest(instance))
                .await?;
            let report = self
                .with_transfer_retries("restore_snapshot", || {
                    self.provider.restore_snapshot(&association.resource, &meta)
                })
                .await?;
            (SyncSource::Snapshot, Some(report.content_hash))
        };

        let endpoint = self
            .provider
            .start_services(&association.resource)
            .await?;

        info!(
            instance = %instance,
            endpoint = %endpoint,
            source = sync_source.annotation(),
            "standby active"
        );
        Ok(StandbyActivation {
            endpoint,
            sync_source,
            content_hash,
        })
    }

    /// Reverse-syncs standby writes to a freshly reserved primary slot,
    /// then tears the standby resource down.
    #[instrument(skip(self))]
    pub async fn restore_to_primary(&self, instance: &InstanceId) -> StandbyResult<()> {
        let association = self
            .registry
            .standby(instance)
            .ok_or_else(|| StandbyError::NotProvisioned(instance.clone()))?;
        let record = self
            .registry
            .get(instance)
            .ok_or_else(|| StandbyError::UnknownInstance(instance.clone()))?;

        let new_slot = self.provider.reserve_slot(&record.host).await?;
        self.provider.start_slot(&record.host, &new_slot).await?;
        // The readiness wait shares the activation budget; a slot that never
        // boots must fail the workflow, not pin it in RestoringPrimary.
        let wait_ready = async {
            loop {
                if self.provider.slot_status(&record.host, &new_slot).await? == SlotStatus::Ready {
                    return Ok::<(), StandbyError>(());
                }
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        };
        match tokio::time::timeout(self.config.activation_budget, wait_ready).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StandbyError::ActivationTimeout(self.config.activation_budget));
            }
        }

        self.with_transfer_retries("sync_from_standby", || {
            self.provider.sync_from_standby(&association.resource, instance)
        })
        .await?;

        self.registry.set_slot(instance, new_slot)?;
        self.provider.teardown_standby(&association.resource).await?;
        self.registry.set_standby(instance, None)?;
        info!(instance = %instance, "restored to primary; standby torn down");
        Ok(())
    }

    /// Tears down the fallback resource without restoring (disable path).
    #[instrument(skip(self))]
    pub async fn deprovision(&self, instance: &InstanceId) -> StandbyResult<()> {
        let Some(association) = self.registry.standby(instance) else {
            return Ok(());
        };
        self.stop_sync(instance);
        self.provider.teardown_standby(&association.resource).await?;
        self.registry.set_standby(instance, None)?;
        info!(instance = %instance, "standby deprovisioned");
        Ok(())
    }

    pub fn status(&self, instance: &InstanceId) -> Option<StandbyAssociation> {
        self.registry.standby(instance)
    }

    fn update_sync_state(
        &self,
        instance: &InstanceId,
        state: SyncState,
        synced_at: Option<DateTime<Utc>>,
    ) -> StandbyResult<()> {
        if let Some(mut association) = self.registry.standby(instance) {
            association.sync_state = state;
            if synced_at.is_some() {
                association.last_synced_at = synced_at;
            }
            self.registry.set_standby(instance, Some(association))?;
        }
        Ok(())
    }

    async fn with_transfer_retries<T, E, F, Fut>(
        &self,
        label: &'static str,
        mut op: F,
    ) -> StandbyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.config.transfer_retries {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(attempt, error = %e, "{label} attempt failed");
                    last_error = e.to_string();
                    if attempt < self.config.transfer_retries {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }
        Err(StandbyError::SyncFailed {
            attempts: self.config.transfer_retries,
            last_error,
        })
    }
}
