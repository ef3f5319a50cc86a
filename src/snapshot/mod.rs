//! Content-addressed snapshot store collaborator.
//!
//! The core never sees snapshot payloads, only identifiers and metadata; the
//! standby manager hands the metadata to the compute provider, which pulls
//! the payload out of band.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{SnapshotError, SnapshotResult};
pub use http::HttpSnapshotStore;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockSnapshotStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::InstanceId;

/// Identifier of a stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata of a stored snapshot; the payload stays inside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: SnapshotId,
    pub instance: InstanceId,
    /// Opaque storage location, passed through to the compute provider.
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Hash of the snapshot content (the store is content-addressed).
    pub content_hash: String,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Requests a fresh snapshot of the instance's current state.
    async fn create_snapshot(&self, instance: &InstanceId) -> SnapshotResult<SnapshotId>;

    /// Metadata of the most recent snapshot for the instance.
    async fn fetch_latest(&self, instance: &InstanceId) -> SnapshotResult<SnapshotMeta>;
}
