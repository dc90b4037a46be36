use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use autopay_core::accounts::AccountRegistry;
use autopay_core::chat::ChatScanner;
use autopay_core::config::GlobalConfig;
use autopay_core::ipc::{self, IpcServer};
use autopay_core::jobs::Jobs;
use autopay_core::ledger::{LedgerStore, SharedLedger};
use autopay_core::protocol::FileProtocol;
use autopay_core::supervisor::{LaunchSpec, Supervisor, SupervisorOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("Autopay core starting");

    let cfg = GlobalConfig::load();

    let registry = Arc::new(AccountRegistry::load(|key| std::env::var(key).ok(), &cfg.accounts_path()));
    let supervisor = Supervisor::new(
        registry,
        FileProtocol::new(&cfg.project_dir),
        LaunchSpec::from_config(&cfg),
        SupervisorOptions::from_config(&cfg),
    );
    supervisor.initialize();
    let supervisor = Arc::new(RwLock::new(supervisor));

    let ledger_path = cfg.ledger_path();
    let ledger = tokio::task::spawn_blocking(move || LedgerStore::load(ledger_path)).await??;
    let ledger = SharedLedger::new(ledger);

    let scanner = ChatScanner::from_config(&cfg)?;
    let jobs = Jobs::start(&cfg, scanner, ledger.clone(), supervisor.clone());

    let token = ipc::auth::resolve_token(&cfg.ipc)?;
    let server = IpcServer::new(&cfg, supervisor.clone(), ledger.clone(), token);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received, cleaning up...");
        signal.cancel();
    });

    if let Err(e) = server.start(shutdown.clone()).await {
        tracing::error!("IPC server error: {}", e);
        shutdown.cancel();
    }

    jobs.stop().await;
    supervisor.write().await.shutdown().await;
    match ledger.with(|s| s.flush()).await {
        Ok(()) => tracing::info!("Ledger saved"),
        Err(e) => tracing::error!("Final ledger flush failed: {}", e),
    }

    tracing::info!("Autopay core shut down");
    Ok(())
}
