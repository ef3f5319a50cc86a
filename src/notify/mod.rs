//! Fire-and-forget webhook notifications.
//!
//! The coordinator enqueues one [`Notification`] per state transition and
//! returns immediately; a dedicated drain task delivers them with a capped
//! number of attempts and exponential backoff. Delivery outcome never feeds
//! back into the state machine. Every attempt is kept in a bounded
//! [`DeliveryLog`] queryable through the management surface.

pub mod config;
pub mod error;
pub mod http;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use config::NotifyConfig;
pub use error::{DeliveryError, DeliveryResult};
pub use http::HttpTransport;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockDeliveryTransport;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::{FailoverPhase, InstanceId, Strategy};

/// Header carrying the keyed hash of the request body.
pub const SIGNATURE_HEADER: &str = "x-lifeline-signature";

const SIGNING_CONTEXT: &str = "lifeline 2025 webhook notification v1";

/// Signs a canonical notification body with the configured key.
pub fn sign_body(key: &str, body: &[u8]) -> String {
    let derived = blake3::derive_key(SIGNING_CONTEXT, key.as_bytes());
    blake3::keyed_hash(&derived, body).to_hex().to_string()
}

/// One outbound state-transition notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// `failover.<phase>`.
    pub event: String,
    pub instance_id: InstanceId,
    pub strategy: Strategy,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notification {
    pub fn new(
        event: impl Into<String>,
        instance: &InstanceId,
        strategy: Strategy,
        detail: Option<String>,
    ) -> Self {
        Self {
            event: event.into(),
            instance_id: instance.clone(),
            strategy,
            timestamp: Utc::now(),
            detail,
        }
    }

    pub fn for_phase(
        phase: FailoverPhase,
        instance: &InstanceId,
        strategy: Strategy,
        detail: Option<String>,
    ) -> Self {
        Self::new(format!("failover.{phase}"), instance, strategy, detail)
    }
}

/// How a notification's delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

/// One delivery attempt within a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub number: u32,
    pub at: DateTime<Utc>,
    /// Backoff slept before this attempt.
    pub backoff_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full delivery history of one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub event: String,
    pub instance_id: InstanceId,
    pub attempts: Vec<DeliveryAttempt>,
    pub outcome: DeliveryOutcome,
}

/// Bounded in-memory log of delivery records, newest kept.
pub struct DeliveryLog {
    capacity: usize,
    inner: Mutex<VecDeque<DeliveryRecord>>,
}

impl DeliveryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, record: DeliveryRecord) {
        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(record);
    }

    /// Up to `limit` most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<DeliveryRecord> {
        self.inner.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Pushes a signed body to the webhook endpoint.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, body: &[u8], signature: &str) -> DeliveryResult<()>;
}

/// Cheap handle the coordinator holds; enqueue never blocks.
#[derive(Clone)]
pub struct NotifierHandle {
    tx: mpsc::Sender<Notification>,
    records: Arc<DeliveryLog>,
}

impl NotifierHandle {
    /// Queues a notification for delivery. A full queue drops the
    /// notification with a warning; the state machine never waits.
    pub fn enqueue(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(event = %n.event, instance = %n.instance_id, "notification queue full; dropping");
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                warn!(event = %n.event, instance = %n.instance_id, "notifier stopped; dropping");
            }
        }
    }

    pub fn records(&self) -> &DeliveryLog {
        &self.records
    }
}

/// Drains the notification queue and keeps the delivery log.
pub struct Notifier {
    transport: Arc<dyn DeliveryTransport>,
    config: NotifyConfig,
    records: Arc<DeliveryLog>,
}

impl Notifier {
    /// Spawns the drain task; the task ends once every handle is dropped
    /// and the queue is empty.
    pub fn spawn(
        transport: Arc<dyn DeliveryTransport>,
        config: NotifyConfig,
    ) -> (NotifierHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(config.queue_capacity);
        let records = Arc::new(DeliveryLog::new(config.record_capacity));
        let handle = NotifierHandle {
            tx,
            records: Arc::clone(&records),
        };

        let notifier = Notifier {
            transport,
            config,
            records,
        };
        let task = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                notifier.deliver_with_retries(notification).await;
            }
            debug!("notification queue drained; notifier stopping");
        });

        (handle, task)
    }

    async fn deliver_with_retries(&self, notification: Notification) {
        let body = match serde_json::to_vec(&notification) {
            Ok(body) => body,
            Err(e) => {
                warn!(event = %notification.event, error = %e, "notification body unserializable; dropping");
                return;
            }
        };
        let signature = sign_body(&self.config.signing_key, &body);

        let mut attempts = Vec::new();
        let mut outcome = DeliveryOutcome::Failed;
        let mut backoff = Duration::ZERO;
        for number in 1..=self.config.attempt_cap {
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            let result = self.transport.deliver(&body, &signature).await;
            let error = result.as_ref().err().map(ToString::to_string);
            attempts.push(DeliveryAttempt {
                number,
                at: Utc::now(),
                backoff_ms: backoff.as_millis() as u64,
                error,
            });
            if result.is_ok() {
                outcome = DeliveryOutcome::Delivered;
                break;
            }
            warn!(
                event = %notification.event,
                instance = %notification.instance_id,
                attempt = number,
                "notification delivery attempt failed"
            );
            backoff = if backoff.is_zero() {
                self.config.initial_backoff
            } else {
                backoff * 2
            };
        }

        if outcome == DeliveryOutcome::Failed {
            warn!(
                event = %notification.event,
                instance = %notification.instance_id,
                attempts = attempts.len(),
                "notification delivery gave up"
            );
        } else {
            debug!(event = %notification.event, instance = %notification.instance_id, "notification delivered");
        }

        self.records.push(DeliveryRecord {
            event: notification.event,
            instance_id: notification.instance_id,
            attempts,
            outcome,
        });
    }
}
