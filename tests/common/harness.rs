//! Test server harness.
//!
//! Spawns the full service — gateway, coordinator, monitor, both recovery
//! managers, and the notifier — against mocked marketplace, snapshot,
//! probe, and webhook edges, listening on a real local port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use lifeline::coordinator::{Coordinator, CoordinatorConfig, Signal};
use lifeline::events::FailoverLog;
use lifeline::gateway::{HandlerState, create_router_with_state};
use lifeline::heartbeat::{HeartbeatConfig, HeartbeatMonitor, MockProbe, Probe};
use lifeline::model::{HostId, SlotId};
use lifeline::notify::{
    DeliveryTransport, MockDeliveryTransport, Notifier, NotifierHandle, NotifyConfig,
};
use lifeline::provider::{ComputeProvider, MockComputeProvider, SlotStatus};
use lifeline::registry::InstanceRegistry;
use lifeline::report::RecoveryReporter;
use lifeline::snapshot::{MockSnapshotStore, SnapshotStore};
use lifeline::standby::{StandbyConfig, StandbyManager};
use lifeline::warmpool::{WarmPoolConfig, WarmPoolManager};

const STARTUP_WAIT_TIMEOUT_SECS: u64 = 5;
const STARTUP_POLL_INTERVAL_MS: u64 = 50;

/// Signing key every test server uses, so tests can verify signatures.
pub const TEST_SIGNING_KEY: &str = "test-signing-key";

pub struct TestServer {
    pub addr: SocketAddr,
    pub provider: Arc<MockComputeProvider>,
    pub snapshots: Arc<MockSnapshotStore>,
    pub probe: Arc<MockProbe>,
    pub transport: Arc<MockDeliveryTransport>,
    pub registry: Arc<InstanceRegistry>,
    pub log: Arc<FailoverLog>,
    pub notifier: NotifierHandle,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Seeds a ready slot so a subsequent registration on this host works.
    pub fn seed_host_slot(&self, host: &str, slot: &str) {
        self.provider
            .seed_slot(&HostId::from(host), &SlotId::new(slot), SlotStatus::Ready);
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerStartupError {
    #[error("Server failed to start within timeout")]
    Timeout,
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

pub async fn wait_for_server_ready(
    addr: SocketAddr,
    timeout: Duration,
    interval: Duration,
) -> Result<(), ServerStartupError> {
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(ServerStartupError::Timeout);
        }

        match tokio::net::TcpStream::connect(addr).await {
            Ok(_) => return Ok(()),
            Err(_) => {
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Spawns a fully-mocked test server on an ephemeral port.
///
/// All external dependencies are mocked:
/// - **Marketplace**: `MockComputeProvider` (in-memory slots and volumes)
/// - **Snapshot store**: `MockSnapshotStore`
/// - **Liveness probe**: `MockProbe` (scriptable per instance)
/// - **Webhook**: `MockDeliveryTransport` (records every signed body)
///
/// Timings come from the `for_testing` configurations, so a full failover
/// loop completes in well under a second.
pub async fn spawn_test_server() -> Result<TestServer, ServerStartupError> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let local_addr = listener.local_addr()?;

    let provider = Arc::new(MockComputeProvider::new());
    let snapshots = Arc::new(MockSnapshotStore::new());
    let registry = Arc::new(InstanceRegistry::new());
    let log = Arc::new(FailoverLog::new());

    let warm_pool = Arc::new(WarmPoolManager::new(
        Arc::clone(&provider) as Arc<dyn ComputeProvider>,
        Arc::clone(&registry),
        WarmPoolConfig::for_testing(),
    ));
    let standby = Arc::new(StandbyManager::new(
        Arc::clone(&provider) as Arc<dyn ComputeProvider>,
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        Arc::clone(&registry),
        StandbyConfig::for_testing(),
    ));

    let (signals, signal_rx) = mpsc::channel::<Signal>(64);
    let probe = Arc::new(MockProbe::new());
    let monitor = Arc::new(HeartbeatMonitor::new(
        Arc::clone(&probe) as Arc<dyn Probe>,
        HeartbeatConfig::for_testing(),
        signals.clone(),
        Arc::clone(&registry),
    ));

    let transport = Arc::new(MockDeliveryTransport::new());
    let notify_config = NotifyConfig {
        signing_key: TEST_SIGNING_KEY.to_string(),
        ..NotifyConfig::for_testing()
    };
    let (notifier, _notifier_task) = Notifier::spawn(
        Arc::clone(&transport) as Arc<dyn DeliveryTransport>,
        notify_config,
    );

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&registry),
        Arc::clone(&log),
        Arc::clone(&warm_pool),
        Arc::clone(&standby),
        Arc::clone(&monitor),
        notifier.clone(),
        CoordinatorConfig::for_testing(),
    ));
    tokio::spawn(Arc::clone(&coordinator).run(signal_rx));

    let reporter = Arc::new(RecoveryReporter::new(
        Arc::clone(&registry),
        Arc::clone(&log),
        signals,
    ));

    let state = HandlerState {
        registry: Arc::clone(&registry),
        log: Arc::clone(&log),
        monitor,
        warm_pool,
        standby,
        coordinator,
        reporter,
        notifier: notifier.clone(),
    };

    let app = create_router_with_state(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    wait_for_server_ready(
        local_addr,
        Duration::from_secs(STARTUP_WAIT_TIMEOUT_SECS),
        Duration::from_millis(STARTUP_POLL_INTERVAL_MS),
    )
    .await?;

    Ok(TestServer {
        addr: local_addr,
        provider,
        snapshots,
        probe,
        transport,
        registry,
        log,
        notifier,
        _server_handle: server_handle,
        shutdown_tx: Some(shutdown_tx),
    })
}

/// Polls `condition` until it holds or the deadline passes.
pub async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
