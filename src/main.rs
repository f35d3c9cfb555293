use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quadra::clock::{Clock, SystemClock};
use quadra::config::Config;
use quadra::engine::Engine;
use quadra::scheduler::{CompactJournal, FinalizeTournaments, RemovePastReservations, Scheduler};
use quadra::seed;
use quadra::store::InMemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    quadra::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(InMemoryStore::open(&config.wal_path())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(Engine::new(store.clone(), clock.clone()));

    seed::seed_courts(store.as_ref()).await?;
    if let Some(date) = config.seed_tournament_date {
        seed::seed_tournament(store.as_ref(), date).await?;
    }

    let mut scheduler = Scheduler::new(clock);
    scheduler.register(Arc::new(RemovePastReservations::new(
        engine.clone(),
        config.reservation_sweep_at,
    )));
    scheduler.register(Arc::new(FinalizeTournaments::new(
        engine.clone(),
        config.tournament_sweep_at,
    )));
    scheduler.register(Arc::new(CompactJournal::new(store.clone(), config.compact_threshold)));

    info!("quadra started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  tasks: {}", scheduler.task_names().join(", "));
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = Arc::new(scheduler).spawn(shutdown_rx);

    shutdown_signal().await?;
    info!("shutdown signal received, stopping scheduler");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            error!("scheduler task ended abnormally: {e}");
        }
    }

    info!("quadra stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
