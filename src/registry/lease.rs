//! Per-instance recovery leases.
//!
//! A workflow acquires the lease for its instance before mutating anything
//! and releases it when the workflow closes. Leases carry an expiry so a
//! crashed workflow task frees its instance without manual intervention.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::InstanceId;

/// Proof of lease ownership. Release and renew require the matching token,
/// so a workflow whose lease expired and was re-acquired by another task
/// cannot release the new holder's lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Lease {
    token: LeaseToken,
    expires_at: Instant,
}

/// Expiring per-instance exclusive leases.
#[derive(Default)]
pub struct LeaseTable {
    leases: Mutex<HashMap<InstanceId, Lease>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lease for `instance`, or returns `None` if a live lease
    /// is already held. An expired lease is treated as free.
    pub fn acquire(&self, instance: &InstanceId, ttl: Duration) -> Option<LeaseToken> {
        let mut leases = self.leases.lock();
        let now = Instant::now();

        if let Some(lease) = leases.get(instance) {
            if lease.expires_at > now {
                return None;
            }
            warn!(instance = %instance, "recovering expired lease from a stalled workflow");
        }

        let token = LeaseToken::generate();
        leases.insert(
            instance.clone(),
            Lease {
                token,
                expires_at: now + ttl,
            },
        );
        debug!(instance = %instance, %token, "acquired recovery lease");
        Some(token)
    }

    /// Extends the expiry of a lease the caller still owns.
    pub fn renew(&self, instance: &InstanceId, token: LeaseToken, ttl: Duration) -> bool {
        let mut leases = self.leases.lock();
        match leases.get_mut(instance) {
            Some(lease) if lease.token == token => {
                lease.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    /// Releases a lease the caller owns. A stale token is a no-op.
    pub fn release(&self, instance: &InstanceId, token: LeaseToken) {
        let mut leases = self.leases.lock();
        if leases.get(instance).is_some_and(|l| l.token == token) {
            leases.remove(instance);
            debug!(instance = %instance, %token, "released recovery lease");
        }
    }

    /// Remaining lifetime in milliseconds of a live lease, if one is held.
    pub fn held_for(&self, instance: &InstanceId) -> Option<u64> {
        let leases = self.leases.lock();
        let lease = leases.get(instance)?;
        let remaining = lease.expires_at.checked_duration_since(Instant::now())?;
        Some(remaining.as_millis() as u64)
    }

    pub fn is_held(&self, instance: &InstanceId) -> bool {
        self.held_for(instance).is_some()
    }
}
