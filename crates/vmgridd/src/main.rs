//! vmgridd — the vmgrid daemon.
//!
//! Single binary that assembles the scheduler:
//! - State store (redb): framework identity, applications, task records
//! - Call sender + event subscription to the resource manager
//! - Scheduler (offer binding, lifecycle control, status routing)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! vmgridd --config /etc/vmgrid/vmgridd.toml --master 10.0.0.5:5050
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use vmgrid_proto::{FrameworkId, FrameworkInfo, calls};
use vmgrid_scheduler::Scheduler;
use vmgrid_state::{Registry, StateStore};
use vmgrid_transport::{CallSender, HttpCallSender};

use crate::config::DaemonConfig;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "vmgridd", about = "vmgrid KVM scheduler daemon")]
struct Cli {
    /// Path to vmgridd.toml. Defaults apply when absent.
    #[arg(long, default_value = "/etc/vmgrid/vmgridd.toml")]
    config: PathBuf,

    /// Resource manager address (host:port), overrides `[master] address`.
    #[arg(long)]
    master: Option<String>,

    /// Data directory, overrides `[store] data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// API listen address, overrides `[api] listen`.
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vmgridd=debug,vmgrid=debug")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = DaemonConfig::load(Some(&cli.config))?;
    if let Some(master) = cli.master {
        config.master.address = master;
    }
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }

    run(config).await
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!(master = %config.master.address, "vmgrid daemon starting");
    let scheduler_config = config.scheduler_config()?;

    // ── State store ────────────────────────────────────────────

    std::fs::create_dir_all(&config.store.data_dir)?;
    let db_path = config.store.data_dir.join("vmgrid.redb");
    let store = Arc::new(StateStore::open(&db_path)?.with_cluster(&config.framework.cluster));
    info!(path = ?db_path, cluster = %store.cluster(), "state store opened");

    // ── Transport + scheduler ──────────────────────────────────

    let mut sender = HttpCallSender::new(config.master.address.clone());
    if let Some(id) = store.registered_framework_id()? {
        info!(framework_id = %id, "reusing registered framework id");
        sender = sender.with_framework_id(FrameworkId::new(id));
    }
    let sender = Arc::new(sender);

    let scheduler = Arc::new(Scheduler::new(
        sender.clone(),
        store.clone(),
        store.clone(),
        scheduler_config.clone(),
    ));
    scheduler.restore(store.list_tasks()?).await;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Event subscription ─────────────────────────────────────

    let subscription_handle = {
        let sender = sender.clone();
        let scheduler = scheduler.clone();
        let info = config.framework_info(None);
        let shutdown_tx = shutdown_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        let timeout = scheduler_config.call_timeout;
        tokio::spawn(async move {
            let result = run_subscription(sender, scheduler, info, timeout, shutdown_rx).await;
            if result.is_err() {
                // Fatal: bring the API server down too.
                let _ = shutdown_tx.send(true);
            }
            result
        })
    };

    // ── API server ─────────────────────────────────────────────

    let router = vmgrid_api::build_router(scheduler);
    let listener = tokio::net::TcpListener::bind(config.api.listen).await?;
    info!(addr = %config.api.listen, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    let _ = shutdown_tx.send(true);
    subscription_handle.await??;

    info!("vmgrid daemon stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => {
                warn!(error = %e, "failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
        }
    };
    let stop = async {
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = stop => {}
    }
}

/// Keep a subscription open, feeding every event to the scheduler.
///
/// Reconnects with exponential backoff when the stream ends. Returns an
/// error only for fatal conditions such as a framework identity mismatch.
async fn run_subscription(
    sender: Arc<HttpCallSender>,
    scheduler: Arc<Scheduler>,
    info: FrameworkInfo,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let mut framework = info.clone();
        framework.id = sender.framework_id();
        let call = calls::subscribe(framework);

        match sender.subscribe(&call, timeout).await {
            Ok(mut subscription) => {
                backoff = INITIAL_BACKOFF;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => return Ok(()),
                        next = subscription.next_event() => match next {
                            Ok(Some(event)) => {
                                if let Err(e) = scheduler.handle_event(event).await {
                                    if e.is_fatal() {
                                        error!(error = %e, "fatal scheduler error");
                                        return Err(e.into());
                                    }
                                    warn!(error = %e, "event handling failed");
                                }
                            }
                            Ok(None) => {
                                warn!("event stream ended");
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "event stream failed");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => warn!(master = %sender.address(), error = %e, "subscribe failed"),
        }

        info!(?backoff, "resubscribing");
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
