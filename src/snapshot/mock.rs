//! In-memory snapshot store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::error::{SnapshotError, SnapshotResult};
use super::{SnapshotId, SnapshotMeta, SnapshotStore};
use crate::model::InstanceId;

/// Seedable snapshot store that counts every call, so tests can assert the
/// zero-transfer property of warm-pool failovers.
#[derive(Default)]
pub struct MockSnapshotStore {
    snapshots: Mutex<HashMap<InstanceId, Vec<SnapshotMeta>>>,
    create_calls: AtomicU32,
    fetch_calls: AtomicU32,
    fail_fetches: AtomicU32,
}

impl MockSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot for `instance` whose content hash is derived from
    /// `payload` the same way the real content-addressed store derives it.
    pub fn seed(&self, instance: &InstanceId, payload: &[u8]) -> SnapshotMeta {
        let id = SnapshotId::generate();
        let meta = SnapshotMeta {
            id,
            instance: instance.clone(),
            location: format!("mock://snapshots/{id}"),
            created_at: Utc::now(),
            size_bytes: payload.len() as u64,
            content_hash: blake3::hash(payload).to_hex().to_string(),
        };
        self.snapshots
            .lock()
            .entry(instance.clone())
            .or_default()
            .push(meta.clone());
        meta
    }

    /// Makes the next `n` fetches fail with an API error.
    pub fn fail_next_fetches(&self, n: u32) {
        self.fail_fetches.store(n, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn latest(&self, instance: &InstanceId) -> Option<SnapshotMeta> {
        self.snapshots.lock().get(instance)?.last().cloned()
    }
}

#[async_trait]
impl SnapshotStore for MockSnapshotStore {
    async fn create_snapshot(&self, instance: &InstanceId) -> SnapshotResult<SnapshotId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let meta = self.seed(instance, instance.as_str().as_bytes());
        Ok(meta.id)
    }

    async fn fetch_latest(&self, instance: &InstanceId) -> SnapshotResult<SnapshotMeta> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_fetches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_fetches.store(remaining - 1, Ordering::SeqCst);
            return Err(SnapshotError::Api {
                op: "fetch_latest".to_string(),
                message: "injected failure".to_string(),
            });
        }

        self.latest(instance)
            .ok_or_else(|| SnapshotError::NoSnapshot(instance.clone()))
    }
}
