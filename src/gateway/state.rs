use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::events::FailoverLog;
use crate::heartbeat::HeartbeatMonitor;
use crate::notify::NotifierHandle;
use crate::registry::InstanceRegistry;
use crate::report::RecoveryReporter;
use crate::standby::StandbyManager;
use crate::warmpool::WarmPoolManager;

/// Everything the management handlers touch.
#[derive(Clone)]
pub struct HandlerState {
    pub registry: Arc<InstanceRegistry>,
    pub log: Arc<FailoverLog>,
    pub monitor: Arc<HeartbeatMonitor>,
    pub warm_pool: Arc<WarmPoolManager>,
    pub standby: Arc<StandbyManager>,
    pub coordinator: Arc<Coordinator>,
    pub reporter: Arc<RecoveryReporter>,
    pub notifier: NotifierHandle,
}
