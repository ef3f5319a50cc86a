//! Recovery coordinator: the state machine between health signals and the
//! two recovery managers.
//!
//! The dispatcher consumes [`Signal`]s from one channel and spawns one
//! workflow task per incident. The workflow owns its instance through an
//! expiring lease, walks
//! `Degraded → StrategySelected → Activating → ActiveOnStandby →
//! SyncingBack → RestoringPrimary → Healthy`, persists every transition on
//! the instance's open failover event, and enqueues one fire-and-forget
//! notification per transition. A failed activation takes the
//! `ActivationFailed` detour and is retried once with the alternate
//! strategy before the event closes `Failed`.

pub mod backend;
pub mod config;
pub mod signal;

#[cfg(test)]
mod tests;

pub use backend::{
    backend_for, ActivationReport, BackendError, BackendResult, RecoveryBackend,
};
pub use config::CoordinatorConfig;
pub use signal::Signal;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::events::{EventId, FailoverLog, FailoverOutcome};
use crate::heartbeat::HeartbeatMonitor;
use crate::model::{FailoverPhase, InstanceId, Strategy, SyncState};
use crate::notify::{Notification, NotifierHandle};
use crate::registry::InstanceRegistry;
use crate::standby::StandbyManager;
use crate::strategy;
use crate::warmpool::WarmPoolManager;

struct Inflight {
    event: EventId,
    /// Flipped to `true` when the primary recovers while the workflow runs.
    recovered_tx: watch::Sender<bool>,
}

pub struct Coordinator {
    registry: Arc<InstanceRegistry>,
    log: Arc<FailoverLog>,
    warm_pool: Arc<WarmPoolManager>,
    standby: Arc<StandbyManager>,
    monitor: Arc<HeartbeatMonitor>,
    notifier: NotifierHandle,
    config: CoordinatorConfig,
    inflight: Mutex<HashMap<InstanceId, Inflight>>,
}

/// How an activation round (including fallback) ended.
enum Activation {
    Activated {
        backend: Arc<dyn RecoveryBackend>,
        strategy: Strategy,
        report: ActivationReport,
    },
    Cancelled,
    Exhausted {
        strategy: Strategy,
        detail: String,
    },
}

impl Coordinator {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        log: Arc<FailoverLog>,
        warm_pool: Arc<WarmPoolManager>,
        standby: Arc<StandbyManager>,
        monitor: Arc<HeartbeatMonitor>,
        notifier: NotifierHandle,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            log,
            warm_pool,
            standby,
            monitor,
            notifier,
            config,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes signals until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut signals: mpsc::Receiver<Signal>) {
        info!("coordinator dispatcher running");
        while let Some(signal) = signals.recv().await {
            self.dispatch(signal);
        }
        info!("signal channel closed; coordinator stopping");
    }

    /// `true` while a recovery workflow owns the instance.
    pub fn is_inflight(&self, instance: &InstanceId) -> bool {
        self.inflight.lock().contains_key(instance)
    }

    fn dispatch(self: &Arc<Self>, signal: Signal) {
        match signal {
            Signal::Degraded {
                instance,
                detected_at,
                simulated,
            } => self.on_degraded(instance, detected_at, simulated),
            Signal::Recovered { instance } => self.on_recovered(&instance),
        }
    }

    fn on_degraded(self: &Arc<Self>, instance: InstanceId, detected_at: DateTime<Utc>, simulated: bool) {
        if self.registry.is_retired(&instance) {
            warn!(instance = %instance, "degraded signal for retired instance ignored");
            return;
        }
        let Some(record) = self.registry.get(&instance) else {
            warn!(instance = %instance, "degraded signal for unknown instance ignored");
            return;
        };

        // A running workflow absorbs further degraded signals.
        {
            let inflight = self.inflight.lock();
            if let Some(entry) = inflight.get(&instance) {
                let _ = self.log.record_coalesced(entry.event);
                debug!(instance = %instance, event = %entry.event, "degraded signal coalesced into running workflow");
                return;
            }
        }

        let Some(token) = self.registry.leases().acquire(&instance, self.config.lease_ttl) else {
            if let Some(open) = self.log.open_event(&instance) {
                let _ = self.log.record_coalesced(open.id);
            }
            warn!(instance = %instance, "recovery lease unavailable; degraded signal dropped");
            return;
        };

        let event = match self
            .log
            .open(instance.clone(), record.configured_strategy, detected_at)
        {
            Ok(event) => event,
            Err(e) => {
                warn!(instance = %instance, error = %e, "could not open failover event");
                self.registry.leases().release(&instance, token);
                return;
            }
        };
        if simulated {
            let _ = self.log.annotate(event, "simulated");
        }
        let _ = self.registry.set_phase(&instance, FailoverPhase::Degraded);
        self.notifier.enqueue(Notification::for_phase(
            FailoverPhase::Degraded,
            &instance,
            record.configured_strategy,
            None,
        ));
        info!(instance = %instance, event = %event, simulated, "failover workflow starting");

        let (recovered_tx, recovered_rx) = watch::channel(false);
        self.inflight
            .lock()
            .insert(instance.clone(), Inflight { event, recovered_tx });

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator
                .run_workflow(&instance, event, detected_at, recovered_rx)
                .await;
            coordinator.inflight.lock().remove(&instance);
            coordinator.registry.leases().release(&instance, token);
        });
    }

    fn on_recovered(&self, instance: &InstanceId) {
        let inflight = self.inflight.lock();
        if let Some(entry) = inflight.get(instance) {
            // The workflow decides whether it is still early enough to
            // cancel; past activation the signal is moot.
            let _ = entry.recovered_tx.send(true);
            debug!(instance = %instance, "recovery forwarded to in-flight workflow");
            return;
        }
        drop(inflight);

        self.monitor.acknowledge_recovered(instance);
        if self.registry.phase(instance) == Some(FailoverPhase::Degraded) {
            let _ = self.registry.set_phase(instance, FailoverPhase::Healthy);
        }
        info!(instance = %instance, "instance recovered without failover");
    }

    #[instrument(skip(self, recovered), fields(event = %event))]
    async fn run_workflow(
        &self,
        instance: &InstanceId,
        event: EventId,
        detected_at: DateTime<Utc>,
        mut recovered: watch::Receiver<bool>,
    ) {
        // Re-select at failover time: host capacity may have changed since
        // registration. A weaker answer is an annotation, not an error.
        let selected = match (self.registry.get(instance), self.registry.host_for(instance)) {
            (Some(record), Some(host)) => {
                let reserved = self.registry.warm_pool(instance).is_some();
                let selected = strategy::select(&record, &host, reserved);
                if strategy::is_degraded(record.configured_strategy, selected) {
                    warn!(instance = %instance, configured = %record.configured_strategy, selected = %selected, "degraded strategy selection");
                    let _ = self.log.annotate(event, "degraded_selection");
                }
                selected
            }
            _ => Strategy::None,
        };
        let _ = self.log.record_strategy(event, selected);

        if selected == Strategy::None {
            self.fail(instance, event, selected, "no recovery strategy available".to_string());
            return;
        }

        self.step(instance, event, FailoverPhase::StrategySelected, selected, None);
        self.step(instance, event, FailoverPhase::Activating, selected, None);

        // A standby whose last sync failed is a sync error observed by this
        // workflow; activation will fall back to the snapshot store.
        if selected == Strategy::CpuStandby
            && self
                .registry
                .standby(instance)
                .is_some_and(|a| a.sync_state == SyncState::Failed)
        {
            let _ = self.log.record_sync_error(event);
        }

        let (backend, active_strategy, report) = match self
            .activate_with_fallback(instance, event, selected, detected_at, &mut recovered)
            .await
        {
            Activation::Activated {
                backend,
                strategy,
                report,
            } => (backend, strategy, report),
            Activation::Cancelled => return,
            Activation::Exhausted { strategy, detail } => {
                self.fail(instance, event, strategy, detail);
                return;
            }
        };

        let _ = self
            .registry
            .set_active_association(instance, Some(backend.kind()));
        for marker in &report.annotations {
            let _ = self.log.annotate(event, marker.clone());
        }
        self.step(
            instance,
            event,
            FailoverPhase::ActiveOnStandby,
            active_strategy,
            Some(format!("endpoint: {}", report.endpoint)),
        );
        info!(instance = %instance, endpoint = %report.endpoint, strategy = %active_strategy, "workload active on standby");

        // Return leg. Neither manager needs the failed primary back: warm
        // pool swaps roles in place, standby reverse-syncs onto a fresh
        // slot.
        self.step(instance, event, FailoverPhase::SyncingBack, active_strategy, None);
        self.step(
            instance,
            event,
            FailoverPhase::RestoringPrimary,
            active_strategy,
            None,
        );
        if let Err(e) = backend.restore(instance).await {
            self.fail(instance, event, active_strategy, format!("restore failed: {e}"));
            return;
        }

        let _ = self.registry.set_active_association(instance, None);
        let _ = self.registry.set_phase(instance, FailoverPhase::Healthy);
        let _ = self.log.close(event, FailoverOutcome::Completed, None);
        self.notifier.enqueue(Notification::new(
            "failover.completed",
            instance,
            active_strategy,
            None,
        ));
        self.monitor.acknowledge_recovered(instance);
        info!(instance = %instance, event = %event, "recovery complete; instance healthy");

        // A standby consumed by the failover is re-armed so protection
        // does not lapse silently.
        if active_strategy == Strategy::CpuStandby
            && let Err(e) = self.standby.ensure_provisioned(instance).await
        {
            warn!(instance = %instance, error = %e, "could not re-provision standby after recovery");
        }
    }

    async fn activate_with_fallback(
        &self,
        instance: &InstanceId,
        event: EventId,
        selected: Strategy,
        detected_at: DateTime<Utc>,
        recovered: &mut watch::Receiver<bool>,
    ) -> Activation {
        let mut strategy = selected;
        let mut remaining_fallbacks = self.config.fallback_attempts;

        loop {
            let Some(backend) = backend_for(strategy, &self.warm_pool, &self.standby) else {
                return Activation::Exhausted {
                    strategy,
                    detail: "no recovery strategy available".to_string(),
                };
            };

            let result = tokio::select! {
                result = backend.activate(instance, detected_at) => result,
                _ = wait_recovered(recovered) => {
                    self.cancel(instance, event, backend.as_ref(), strategy).await;
                    return Activation::Cancelled;
                }
            };

            let error = match result {
                Ok(report) => {
                    return Activation::Activated {
                        backend,
                        strategy,
                        report,
                    };
                }
                Err(e) => e,
            };

            warn!(instance = %instance, strategy = %strategy, error = %error, "activation failed");
            let _ = self.log.record_error_detail(event, error.to_string());
            self.step(
                instance,
                event,
                FailoverPhase::ActivationFailed,
                strategy,
                Some(error.to_string()),
            );
            if let Err(e) = backend.deactivate(instance).await {
                warn!(instance = %instance, error = %e, "rollback after failed activation failed");
            }

            let alternate = strategy.alternate();
            let permitted = self.registry.get(instance).is_some_and(|r| match alternate {
                Strategy::WarmPool => r.policy.warm_pool_enabled,
                Strategy::CpuStandby => r.policy.standby_enabled,
                Strategy::None => false,
            });
            if remaining_fallbacks == 0 || alternate == strategy || !permitted {
                return Activation::Exhausted {
                    strategy,
                    detail: format!("all permitted strategies exhausted: {error}"),
                };
            }

            remaining_fallbacks -= 1;
            strategy = alternate;
            let _ = self.log.record_strategy(event, strategy);
            let _ = self.log.annotate(event, "fallback");
            info!(instance = %instance, strategy = %strategy, "falling back to alternate strategy");
            self.step(instance, event, FailoverPhase::Activating, strategy, None);
        }
    }

    /// Spontaneous primary recovery before activation completed: roll back
    /// the partial standby, close the event `Cancelled`, clear the latch.
    async fn cancel(
        &self,
        instance: &InstanceId,
        event: EventId,
        backend: &dyn RecoveryBackend,
        strategy: Strategy,
    ) {
        info!(instance = %instance, event = %event, "primary recovered mid-activation; cancelling failover");
        if let Err(e) = backend.deactivate(instance).await {
            warn!(instance = %instance, error = %e, "rollback after cancellation failed");
        }
        let _ = self.registry.set_active_association(instance, None);
        let _ = self.registry.set_phase(instance, FailoverPhase::Healthy);
        let _ = self.log.close(event, FailoverOutcome::Cancelled, None);
        self.notifier.enqueue(Notification::new(
            "failover.cancelled",
            instance,
            strategy,
            Some("primary recovered before activation completed".to_string()),
        ));
        self.monitor.acknowledge_recovered(instance);
    }

    /// Terminal failure: the event closes `Failed` and the degraded latch
    /// stays set so the incident is not re-signalled. Operator action
    /// required.
    fn fail(&self, instance: &InstanceId, event: EventId, strategy: Strategy, detail: String) {
        error!(instance = %instance, event = %event, detail = %detail, "recovery failed; operator intervention required");
        let _ = self.registry.set_phase(instance, FailoverPhase::Failed);
        let _ = self.log.record_phase(event, FailoverPhase::Failed);
        let _ = self.log.close(event, FailoverOutcome::Failed, Some(detail.clone()));
        self.notifier.enqueue(Notification::new(
            "failover.failed",
            instance,
            strategy,
            Some(detail),
        ));
    }

    /// One transition: phase on the registry, phase on the event, one
    /// notification.
    fn step(
        &self,
        instance: &InstanceId,
        event: EventId,
        phase: FailoverPhase,
        strategy: Strategy,
        detail: Option<String>,
    ) {
        let _ = self.registry.set_phase(instance, phase);
        if let Err(e) = self.log.record_phase(event, phase) {
            warn!(instance = %instance, error = %e, "could not record phase transition");
        }
        self.notifier
            .enqueue(Notification::for_phase(phase, instance, strategy, detail));
        debug!(instance = %instance, phase = %phase, "workflow transition");
    }
}

/// Resolves once the primary has been reported recovered. Pends forever if
/// the dispatcher is gone, which leaves cancellation to the lease expiry.
async fn wait_recovered(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
