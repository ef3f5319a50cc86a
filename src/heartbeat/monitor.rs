use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::HeartbeatConfig;
use super::{Probe, ProbeOutcome};
use crate::coordinator::Signal;
use crate::model::InstanceId;
use crate::registry::InstanceRegistry;

#[derive(Debug, Default)]
struct ProbeState {
    consecutive_misses: u32,
    /// Start of the current run of misses; runs older than the miss window
    /// restart counting instead of accumulating.
    first_miss_at: Option<Instant>,
    /// Latched on threshold; cleared only by coordinator acknowledgment.
    degraded: bool,
    transport_failing_since: Option<Instant>,
}

/// Runs one probe task per protected instance and turns probe outcomes into
/// coordinator signals.
pub struct HeartbeatMonitor {
    probe: Arc<dyn Probe>,
    config: HeartbeatConfig,
    signals: mpsc::Sender<Signal>,
    registry: Arc<InstanceRegistry>,
    state: Mutex<HashMap<InstanceId, ProbeState>>,
    tasks: Mutex<HashMap<InstanceId, JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(
        probe: Arc<dyn Probe>,
        config: HeartbeatConfig,
        signals: mpsc::Sender<Signal>,
        registry: Arc<InstanceRegistry>,
    ) -> Self {
        Self {
            probe,
            config,
            signals,
            registry,
            state: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts the periodic probe task for an instance (no-op if running).
    pub fn start(self: &Arc<Self>, instance: InstanceId) {
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&instance) {
            return;
        }

        let monitor = Arc::clone(self);
        let id = instance.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.probe_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let outcome = match tokio::time::timeout(
                    monitor.config.probe_timeout,
                    monitor.probe.probe(&id),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => ProbeOutcome::TransportError,
                };
                monitor.observe(&id, outcome).await;
            }
        });

        tasks.insert(instance, handle);
    }

    /// Stops probing an instance and forgets its miss accounting.
    pub fn stop(&self, instance: &InstanceId) {
        if let Some(handle) = self.tasks.lock().remove(instance) {
            handle.abort();
        }
        self.state.lock().remove(instance);
    }

    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        self.state.lock().clear();
    }

    pub fn probed_instances(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Records a probe outcome and emits at most one degraded signal per
    /// incident. Public so tests can drive miss sequences directly.
    pub async fn observe(&self, instance: &InstanceId, outcome: ProbeOutcome) {
        if self.registry.is_retired(instance) {
            warn!(instance = %instance, "probe outcome for retired instance ignored");
            return;
        }

        let signal = {
            let mut states = self.state.lock();
            let state = states.entry(instance.clone()).or_default();
            self.apply(instance, state, outcome)
        };

        if let Some(signal) = signal
            && self.signals.send(signal).await.is_err()
        {
            warn!(instance = %instance, "coordinator signal channel closed");
        }
    }

    /// Clears the degraded latch; only the coordinator calls this.
    pub fn acknowledge_recovered(&self, instance: &InstanceId) {
        let mut states = self.state.lock();
        if let Some(state) = states.get_mut(instance) {
            state.degraded = false;
            state.consecutive_misses = 0;
            state.first_miss_at = None;
            state.transport_failing_since = None;
            debug!(instance = %instance, "degraded latch cleared");
        }
    }

    pub fn miss_count(&self, instance: &InstanceId) -> u32 {
        self.state
            .lock()
            .get(instance)
            .map(|s| s.consecutive_misses)
            .unwrap_or(0)
    }

    pub fn is_degraded(&self, instance: &InstanceId) -> bool {
        self.state
            .lock()
            .get(instance)
            .is_some_and(|s| s.degraded)
    }

    fn apply(
        &self,
        instance: &InstanceId,
        state: &mut ProbeState,
        outcome: ProbeOutcome,
    ) -> Option<Signal> {
        let now = Instant::now();
        match outcome {
            ProbeOutcome::Healthy => {
                state.consecutive_misses = 0;
                state.first_miss_at = None;
                state.transport_failing_since = None;
                if state.degraded {
                    // The latch stays set; the coordinator decides whether
                    // this recovery cancels an in-flight workflow.
                    debug!(instance = %instance, "healthy probe while degraded");
                    return Some(Signal::Recovered {
                        instance: instance.clone(),
                    });
                }
                None
            }
            ProbeOutcome::Unhealthy => {
                state.transport_failing_since = None;
                self.count_miss(instance, state, now)
            }
            ProbeOutcome::TransportError => {
                let since = *state.transport_failing_since.get_or_insert(now);
                if now.duration_since(since) < self.config.transport_grace {
                    debug!(instance = %instance, "transport error within grace period");
                    return None;
                }
                // Sustained transport failure counts as misses.
                self.count_miss(instance, state, now)
            }
        }
    }

    fn count_miss(
        &self,
        instance: &InstanceId,
        state: &mut ProbeState,
        now: Instant,
    ) -> Option<Signal> {
        match state.first_miss_at {
            Some(first) if now.duration_since(first) <= self.config.miss_window => {
                state.consecutive_misses += 1;
            }
            _ => {
                state.first_miss_at = Some(now);
                state.consecutive_misses = 1;
            }
        }
        debug!(
            instance = %instance,
            misses = state.consecutive_misses,
            "heartbeat miss"
        );

        if state.consecutive_misses >= self.config.miss_threshold && !state.degraded {
            state.degraded = true;
            info!(instance = %instance, misses = state.consecutive_misses, "instance flagged degraded");
            return Some(Signal::Degraded {
                instance: instance.clone(),
                detected_at: Utc::now(),
                simulated: false,
            });
        }
        None
    }
}
