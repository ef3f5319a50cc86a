//! Lifeline HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;

use lifeline::config::Config;
use lifeline::coordinator::{Coordinator, CoordinatorConfig, Signal};
use lifeline::events::FailoverLog;
use lifeline::gateway::{HandlerState, create_router_with_state};
use lifeline::heartbeat::{HeartbeatConfig, HeartbeatMonitor, HttpProbe, Probe};
use lifeline::notify::{DeliveryTransport, HttpTransport, Notifier, NotifyConfig};
use lifeline::provider::{ComputeProvider, MarketplaceClient};
use lifeline::registry::InstanceRegistry;
use lifeline::report::RecoveryReporter;
use lifeline::snapshot::{HttpSnapshotStore, SnapshotStore};
use lifeline::standby::{StandbyConfig, StandbyManager};
use lifeline::warmpool::{WarmPoolConfig, WarmPoolManager};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
██╗     ██╗███████╗███████╗██╗     ██╗███╗   ██╗███████╗
██║     ██║██╔════╝██╔════╝██║     ██║████╗  ██║██╔════╝
██║     ██║█████╗  █████╗  ██║     ██║██╔██╗ ██║█████╗
██║     ██║██╔══╝  ██╔══╝  ██║     ██║██║╚██╗██║██╔══╝
███████╗██║██║     ███████╗███████╗██║██║ ╚████║███████╗
╚══════╝╚═╝╚═╝     ╚══════╝╚══════╝╚═╝╚═╝  ╚═══╝╚══════╝

        DETECT. FAIL OVER. RESTORE.
                                        AGPL-3.0
"#
    );

    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        marketplace = %config.marketplace_url,
        "Lifeline starting"
    );

    let notify_config = NotifyConfig::from_env();
    notify_config.validate()?;
    let standby_config = StandbyConfig::from_env();
    standby_config.validate()?;

    let provider: Arc<dyn ComputeProvider> =
        Arc::new(MarketplaceClient::new(config.marketplace_url.clone()));
    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(HttpSnapshotStore::new(config.snapshot_url.clone()));

    let registry = Arc::new(InstanceRegistry::new());
    let log = Arc::new(FailoverLog::new());

    let warm_pool = Arc::new(WarmPoolManager::new(
        Arc::clone(&provider),
        Arc::clone(&registry),
        WarmPoolConfig::from_env(),
    ));
    let standby = Arc::new(StandbyManager::new(
        Arc::clone(&provider),
        Arc::clone(&snapshots),
        Arc::clone(&registry),
        standby_config,
    ));

    let (signals, signal_rx) = mpsc::channel::<Signal>(256);

    let heartbeat_config = HeartbeatConfig::from_env();
    let probe: Arc<dyn Probe> = Arc::new(HttpProbe::new(
        config.marketplace_url.clone(),
        heartbeat_config.probe_timeout,
    ));
    let monitor = Arc::new(HeartbeatMonitor::new(
        probe,
        heartbeat_config,
        signals.clone(),
        Arc::clone(&registry),
    ));

    let transport: Arc<dyn DeliveryTransport> =
        Arc::new(HttpTransport::new(notify_config.endpoint.clone()));
    if notify_config.endpoint.is_none() {
        tracing::warn!("No LIFELINE_WEBHOOK_ENDPOINT configured, notifications are logged only");
    }
    let (notifier, notifier_task) = Notifier::spawn(transport, notify_config);

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&registry),
        Arc::clone(&log),
        Arc::clone(&warm_pool),
        Arc::clone(&standby),
        Arc::clone(&monitor),
        notifier.clone(),
        CoordinatorConfig::from_env(),
    ));
    let coordinator_task = tokio::spawn(Arc::clone(&coordinator).run(signal_rx));

    let reporter = Arc::new(RecoveryReporter::new(
        Arc::clone(&registry),
        Arc::clone(&log),
        signals,
    ));

    let state = HandlerState {
        registry,
        log,
        monitor: Arc::clone(&monitor),
        warm_pool,
        standby: Arc::clone(&standby),
        coordinator,
        reporter,
        notifier,
    };

    let app = create_router_with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop_all();
    standby.stop_all_sync();
    coordinator_task.abort();

    // The router and coordinator held the last notifier handles; with those
    // gone the drain task finishes whatever is still queued and exits.
    if tokio::time::timeout(Duration::from_secs(5), notifier_task)
        .await
        .is_err()
    {
        tracing::warn!("notification queue did not drain in time");
    }

    tracing::info!("Lifeline shutdown complete");
    Ok(())
}

fn run_health_check() -> i32 {
    let port = std::env::var("LIFELINE_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{}/healthz", port);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    rt.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .expect("failed to build client");

        match client.get(&url).send().await {
            Ok(res) if res.status().is_success() => 0,
            _ => 1,
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
