//! Standalone mode: every component in one process.
//!
//! The daemon:
//! 1. Opens the state store under `server.data_dir`
//! 2. Builds the in-memory cluster and staging substrates
//! 3. Assembles the orchestrator from the effective configuration and drops
//!    workload references the fresh in-memory cluster does not know
//! 4. Serves the REST API until Ctrl-C, then cancels in-flight waits

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use berth_core::{BerthConfig, CancelSignal};
use berth_orchestrator::{Orchestrator, OrchestratorSettings};
use berth_state::StateStore;
use berth_substrate::{MemoryCluster, MemoryStager};

pub async fn run(config: BerthConfig) -> anyhow::Result<()> {
    info!("berth daemon starting in standalone mode");

    let data_dir = &config.server.data_dir;
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("berth.redb");

    // ── State store ────────────────────────────────────────────
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // ── Substrates ─────────────────────────────────────────────
    let cluster = Arc::new(MemoryCluster::new());
    let stager = Arc::new(MemoryStager::new());
    info!("in-memory cluster and stager initialized");

    // ── Orchestrator ───────────────────────────────────────────
    let settings = OrchestratorSettings::from_config(&config);
    info!(
        deploy_timeout = ?settings.deploy_timeout,
        domain = %settings.domain,
        app_charts = ?settings.app_charts,
        "orchestrator initialized"
    );
    let orchestrator = Orchestrator::new(store, cluster, stager, settings);
    let forgotten = orchestrator.forget_lost_workloads().await?;
    if !forgotten.is_empty() {
        info!(count = forgotten.len(), "stale workload references cleared, push or restage to redeploy");
    }

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── API server ─────────────────────────────────────────────
    let router = berth_api::build_router(orchestrator, CancelSignal::from_watch(shutdown_rx));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C. Firing the watch makes blocked
    // staging and readiness waits return `Cancelled`.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("berth daemon stopped");
    Ok(())
}
