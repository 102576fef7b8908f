//! diskwarden - storage health monitoring agent

use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod collectors;
mod config;
mod debuglog;
mod discovery;
mod error;
mod health;
mod notify;
mod scheduler;
mod startup;
mod store;
mod types;
mod uplink;

use collectors::{NvmeCollector, SmartCollector, TempDecode, ZfsCollector};
use discovery::Discovery;
use health::StoreBackedProvider;
use notify::Notifier;
use scheduler::Scheduler;
use store::Store;
use uplink::Uplink;

#[derive(Parser, Debug)]
#[command(name = "diskwarden")]
#[command(about = "Storage health monitoring agent")]
struct Args {
    /// Run one discovery + collection + health pass and exit
    #[arg(long)]
    once: bool,

    /// Log level filter
    #[arg(long, env = "DISKWARDEN_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting diskwarden v{}", env!("CARGO_PKG_VERSION"));

    // Configuration errors are fatal here and nowhere else
    let cfg = config::Config::from_env()?;

    // Preflight before any loop starts: probe binaries must resolve and
    // every configured file path needs a writable parent
    startup::run_checks(&cfg.tools)?;
    startup::ensure_paths(&[&cfg.paths.db_path, &cfg.paths.debug_log])?;

    let store = Arc::new(Store::open(&cfg.paths.db_path)?);
    tracing::info!(path = %cfg.paths.db_path, "opened state database");

    let debug_log = debuglog::DebugLog::open(&cfg.paths.debug_log).map(Arc::new);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Unit-inference cutoffs for unlabelled temperatures; overridable because
    // the defaults are heuristics, not facts
    let mut decode = TempDecode::default();
    if let Some(v) = env_f64("DISKWARDEN_SMART_FAHRENHEIT_OVER") {
        decode.smart_fahrenheit_over = v;
    }
    if let Some(v) = env_f64("DISKWARDEN_NVME_KELVIN_OVER") {
        decode.nvme_kelvin_over = v;
    }

    let discovery = Arc::new(Discovery::new(
        store.clone(),
        cfg.storage.clone(),
        cfg.tools.zpool.clone(),
        debug_log,
    ));
    let smart = Arc::new(SmartCollector::new(
        store.clone(),
        cfg.tools.smartctl.clone(),
        decode,
    ));
    let nvme = Arc::new(NvmeCollector::new(
        store.clone(),
        cfg.tools.nvme.clone(),
        decode,
    ));
    let zfs = Arc::new(ZfsCollector::new(store.clone(), cfg.tools.zpool.clone()));

    let health: Arc<dyn health::HealthProvider> = Arc::new(StoreBackedProvider::new(
        store.clone(),
        cfg.scheduling.clone(),
        cfg.alerts.clone(),
    ));

    let notifier = Arc::new(Notifier::new(
        store.clone(),
        cfg.notifications.clone(),
        cfg.alerts.debounce_window,
        cfg.alerts.min_severity,
    ));

    let uplink = if cfg.cloud.enabled {
        let hostname = if cfg.cloud.hostname.is_empty() {
            system_hostname()
        } else {
            cfg.cloud.hostname.clone()
        };
        let client = Arc::new(Uplink::new(
            &cfg.cloud.endpoint,
            &cfg.cloud.api_token,
            &cfg.cloud.host_id,
            &hostname,
            shutdown_tx.clone(),
        ));

        if cfg.cloud.host_id.is_empty() {
            match client
                .register(std::env::consts::OS, env!("CARGO_PKG_VERSION"))
                .await
            {
                Ok(host_id) => {
                    tracing::info!(host_id = %host_id, "registered with cloud collector; set DISKWARDEN_CLOUD_HOST_ID to persist");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cloud registration failed; uploads will retry unregistered");
                }
            }
        }
        Some(client)
    } else {
        None
    };

    let scheduler = Arc::new(Scheduler::new(
        store,
        cfg.scheduling.clone(),
        cfg.cloud.clone(),
        discovery,
        smart,
        nvme,
        zfs,
        health,
        notifier.clone(),
        uplink,
        shutdown_tx.clone(),
    ));

    if args.once {
        tracing::info!("running single collection pass");
        scheduler.run_once().await;
        return Ok(());
    }

    let mut handles = scheduler.start().await;

    {
        let notifier = notifier.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            notifier.run(shutdown_rx).await;
        }));
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping loops");
    let _ = shutdown_tx.send(());

    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn system_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Wait for SIGTERM or SIGINT
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
