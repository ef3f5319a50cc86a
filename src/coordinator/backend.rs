//! Shared capability surface over the two recovery managers.
//!
//! The workflow never matches on a concrete manager: the selector picks a
//! [`Strategy`], the coordinator resolves it to a backend once, and every
//! subsequent step (activate, roll back, restore) goes through this trait.
//! Manager errors are translated here; the distinction the state machine
//! cares about is timeout versus any other failure.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AssociationKind, InstanceId, Strategy};
use crate::standby::{StandbyError, StandbyManager};
use crate::warmpool::{WarmPoolError, WarmPoolManager};

#[derive(Debug, Error)]
pub enum BackendError {
    /// Activation exceeded its bound; triggers the configured fallback.
    #[error("activation timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Failed(String),
}

impl From<WarmPoolError> for BackendError {
    fn from(e: WarmPoolError) -> Self {
        match e {
            WarmPoolError::ActivationTimeout(_) => BackendError::Timeout(e.to_string()),
            other => BackendError::Failed(other.to_string()),
        }
    }
}

impl From<StandbyError> for BackendError {
    fn from(e: StandbyError) -> Self {
        match e {
            StandbyError::ActivationTimeout(_) => BackendError::Timeout(e.to_string()),
            other => BackendError::Failed(other.to_string()),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// What a successful activation hands back to the workflow.
#[derive(Debug, Clone)]
pub struct ActivationReport {
    pub endpoint: String,
    /// Markers copied onto the failover event (`sync_source:...`).
    pub annotations: Vec<String>,
}

#[async_trait]
pub trait RecoveryBackend: Send + Sync {
    fn kind(&self) -> AssociationKind;

    /// Brings the standby resource online and returns its endpoint.
    async fn activate(
        &self,
        instance: &InstanceId,
        detected_at: DateTime<Utc>,
    ) -> BackendResult<ActivationReport>;

    /// Rolls back a partially-started activation.
    async fn deactivate(&self, instance: &InstanceId) -> BackendResult<()>;

    /// Returns the workload to a primary slot after a completed failover.
    async fn restore(&self, instance: &InstanceId) -> BackendResult<()>;
}

#[async_trait]
impl RecoveryBackend for WarmPoolManager {
    fn kind(&self) -> AssociationKind {
        AssociationKind::WarmPool
    }

    async fn activate(
        &self,
        instance: &InstanceId,
        _detected_at: DateTime<Utc>,
    ) -> BackendResult<ActivationReport> {
        let endpoint = WarmPoolManager::activate(self, instance).await?;
        Ok(ActivationReport {
            endpoint,
            annotations: Vec::new(),
        })
    }

    async fn deactivate(&self, instance: &InstanceId) -> BackendResult<()> {
        WarmPoolManager::deactivate(self, instance).await?;
        Ok(())
    }

    /// On a shared-volume host the activated slot simply becomes the new
    /// primary; restore is the role swap performed by deactivate.
    async fn restore(&self, instance: &InstanceId) -> BackendResult<()> {
        WarmPoolManager::deactivate(self, instance).await?;
        Ok(())
    }
}

#[async_trait]
impl RecoveryBackend for StandbyManager {
    fn kind(&self) -> AssociationKind {
        AssociationKind::Standby
    }

    /// Provisions on demand so the fallback path works even when standby
    /// was not the configured strategy.
    async fn activate(
        &self,
        instance: &InstanceId,
        detected_at: DateTime<Utc>,
    ) -> BackendResult<ActivationReport> {
        self.ensure_provisioned(instance).await?;
        let activation = StandbyManager::activate(self, instance, detected_at).await?;
        Ok(ActivationReport {
            endpoint: activation.endpoint,
            annotations: vec![activation.sync_source.annotation().to_string()],
        })
    }

    /// The external resource persists across cancellations by design; it
    /// goes back to being a sync target.
    async fn deactivate(&self, _instance: &InstanceId) -> BackendResult<()> {
        Ok(())
    }

    async fn restore(&self, instance: &InstanceId) -> BackendResult<()> {
        self.restore_to_primary(instance).await?;
        Ok(())
    }
}

/// Resolves a selected strategy to its backend, if the strategy has one.
pub fn backend_for(
    strategy: Strategy,
    warm_pool: &Arc<WarmPoolManager>,
    standby: &Arc<StandbyManager>,
) -> Option<Arc<dyn RecoveryBackend>> {
    match strategy {
        Strategy::WarmPool => Some(Arc::clone(warm_pool) as Arc<dyn RecoveryBackend>),
        Strategy::CpuStandby => Some(Arc::clone(standby) as Arc<dyn RecoveryBackend>),
        Strategy::None => None,
    }
}
