//! Reliability reporting over closed failover events, plus the simulation
//! entry point that drives the coordinator without a genuine heartbeat miss.

pub mod error;


pub use error::{ReportError, ReportResult};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::coordinator::Signal;
use crate::events::{FailoverEvent, FailoverLog, FailoverOutcome};
use crate::model::InstanceId;
use crate::registry::InstanceRegistry;

/// Aggregate recovery statistics.
///
/// `mttr_seconds` averages detection-to-restore time over completed
/// recoveries. `mtbf_seconds` averages the gap between consecutive
/// incidents of the same instance, over instances with at least two.
/// Cancelled workflows count as incidents but neither successes nor
/// failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub generated_at: DateTime<Utc>,
    pub total_incidents: usize,
    pub open: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mttr_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtbf_seconds: Option<f64>,
    pub includes_simulated: bool,
}

pub struct RecoveryReporter {
    registry: Arc<InstanceRegistry>,
    log: Arc<FailoverLog>,
    signals: mpsc::Sender<Signal>,
}

impl RecoveryReporter {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        log: Arc<FailoverLog>,
        signals: mpsc::Sender<Signal>,
    ) -> Self {
        Self {
            registry,
            log,
            signals,
        }
    }

    pub fn report(&self, include_simulated: bool) -> RecoveryReport {
        let events: Vec<FailoverEvent> = self
            .log
            .events()
            .into_iter()
            .filter(|e| include_simulated || !e.has_annotation("simulated"))
            .collect();

        let open = events.iter().filter(|e| e.is_open()).count();
        let count_of = |outcome| {
            events
                .iter()
                .filter(|e| e.outcome == Some(outcome))
                .count()
        };
        let completed = count_of(FailoverOutcome::Completed);
        let cancelled = count_of(FailoverOutcome::Cancelled);
        let failed = count_of(FailoverOutcome::Failed);

        let decided = completed + failed;
        let success_rate = (decided > 0).then(|| completed as f64 / decided as f64);

        RecoveryReport {
            generated_at: Utc::now(),
            total_incidents: events.len(),
            open,
            completed,
            cancelled,
            failed,
            success_rate,
            mttr_seconds: mean_time_to_recovery(&events),
            mtbf_seconds: mean_time_between_failures(&events),
            includes_simulated: include_simulated,
        }
    }

    /// Injects a synthetic degraded signal for an instance. The resulting
    /// event is annotated `simulated` and excludable from reports.
    pub async fn simulate(&self, instance: &InstanceId) -> ReportResult<()> {
        if self.registry.get(instance).is_none() {
            return Err(ReportError::UnknownInstance(instance.clone()));
        }
        info!(instance = %instance, "injecting simulated failover");
        self.signals
            .send(Signal::Degraded {
                instance: instance.clone(),
                detected_at: Utc::now(),
                simulated: true,
            })
            .await
            .map_err(|_| ReportError::CoordinatorUnavailable)
    }
}

fn mean_time_to_recovery(events: &[FailoverEvent]) -> Option<f64> {
    let durations: Vec<f64> = events
        .iter()
        .filter(|e| e.outcome == Some(FailoverOutcome::Completed))
        .filter_map(|e| e.recovery_time())
        .map(|d| d.num_milliseconds() as f64 / 1000.0)
        .collect();
    if durations.is_empty() {
        return None;
    }
    Some(durations.iter().sum::<f64>() / durations.len() as f64)
}

/// Mean gap between consecutive incidents of the same instance, pooled
/// across every instance that has at least two.
fn mean_time_between_failures(events: &[FailoverEvent]) -> Option<f64> {
    let mut by_instance: HashMap<&InstanceId, Vec<DateTime<Utc>>> = HashMap::new();
    for event in events {
        by_instance
            .entry(&event.instance)
            .or_default()
            .push(event.detected_at);
    }

    let mut gaps = Vec::new();
    for detections in by_instance.values_mut() {
        detections.sort();
        for pair in detections.windows(2) {
            gaps.push(pair[1].signed_duration_since(pair[0]).num_milliseconds() as f64 / 1000.0);
        }
    }
    if gaps.is_empty() {
        return None;
    }
    Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
}
