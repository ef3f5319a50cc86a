use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{FailoverPhase, InstanceId, Strategy};

/// Unique identifier of a failover event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a recovery workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverOutcome {
    /// Full loop closed: workload back on a healthy primary.
    Completed,
    /// Primary recovered spontaneously before activation finished.
    Cancelled,
    /// Every permitted strategy attempt was exhausted.
    Failed,
}

impl FailoverOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverOutcome::Completed => "completed",
            FailoverOutcome::Cancelled => "cancelled",
            FailoverOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FailoverOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recovery workflow, from detection to close.
///
/// `activated_at` is never earlier than `detected_at`; the log clamps it on
/// write so wall-clock skew cannot break reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub id: EventId,
    pub instance: InstanceId,
    /// Strategy in use; updated once if the workflow falls back.
    pub strategy: Strategy,
    pub detected_at: DateTime<Utc>,
    /// Set when the workflow reaches `ActiveOnStandby`.
    pub activated_at: Option<DateTime<Utc>>,
    /// Set when the event closes, whatever the outcome.
    pub restored_at: Option<DateTime<Utc>>,
    /// Last phase recorded for this workflow.
    pub phase: FailoverPhase,
    /// `None` while the workflow is still running.
    pub outcome: Option<FailoverOutcome>,
    pub error_detail: Option<String>,
    /// Free-form markers: `simulated`, `degraded_selection`,
    /// `sync_source:snapshot`, ...
    pub annotations: Vec<String>,
    /// Sync failures observed during this workflow (retried, non-fatal).
    pub sync_errors: u32,
    /// Degraded signals absorbed while this workflow was already running.
    pub coalesced_signals: u32,
}

impl FailoverEvent {
    pub fn is_open(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn has_annotation(&self, marker: &str) -> bool {
        self.annotations.iter().any(|a| a == marker)
    }

    /// Detection-to-restore duration for closed events.
    pub fn recovery_time(&self) -> Option<chrono::Duration> {
        self.restored_at
            .map(|restored| restored.signed_duration_since(self.detected_at))
    }
}
