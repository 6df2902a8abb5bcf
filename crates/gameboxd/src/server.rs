//! Serve mode: opens the record store, wires the orchestrator to the
//! configured cluster gateway, runs the reclaimer, and serves the REST API.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use gamebox_api::{ApiState, build_router};
use gamebox_cluster::{ClusterGateway, InMemoryGateway, KubeGateway};
use gamebox_core::{ClusterMode, GameboxConfig};
use gamebox_orchestrator::{Orchestrator, Reclaimer, Stores};
use gamebox_state::StateStore;

fn build_gateway(config: &GameboxConfig) -> anyhow::Result<Arc<dyn ClusterGateway>> {
    match config.cluster.mode {
        ClusterMode::Kube => {
            let api_url = config
                .cluster
                .api_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("cluster.api_url is not set"))?;
            let gateway = KubeGateway::new(
                api_url,
                config.cluster.token.clone(),
                config.cluster_timeout()?,
            )?;
            info!(authority = gateway.authority(), "kubernetes gateway configured");
            Ok(Arc::new(gateway))
        }
        ClusterMode::Memory => {
            info!("in-memory cluster gateway configured; no real workloads will run");
            Ok(Arc::new(InMemoryGateway::new()))
        }
    }
}

/// Run until Ctrl-C.
pub async fn run(config: GameboxConfig) -> anyhow::Result<()> {
    info!("Gamebox daemon starting");

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("gamebox.redb");

    // ── Record store ─────────────────────────────────────────────
    let store = StateStore::open(&db_path)?.with_allocation_scope(config.allocation.scope)?;
    info!(path = ?db_path, scope = %config.allocation.scope, "record store opened");

    // ── Orchestrator ─────────────────────────────────────────────
    let gateway = build_gateway(&config)?;
    let ttl = config.allocation_ttl()?;
    let orchestrator = Arc::new(Orchestrator::new(Stores::from_state(store), gateway).with_ttl(ttl));
    info!(ttl_secs = ttl.as_secs(), "orchestrator initialized");

    // ── Reclaimer ────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reclaimer = Reclaimer::new(orchestrator.clone(), config.reclaim_interval()?);
    let reclaimer_handle = tokio::spawn(async move {
        reclaimer.run(shutdown_rx).await;
    });

    // ── REST API server ──────────────────────────────────────────
    if config.admin.token.is_none() {
        info!("no admin token configured; admin routes are disabled");
    }
    let router = build_router(ApiState::new(orchestrator, config.admin.token.clone()));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c; shutting down");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = reclaimer_handle.await;
    info!("Gamebox daemon stopped");
    Ok(())
}
