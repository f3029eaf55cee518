// Process lifecycle: build the backend, drive the scheduler, stop on
// SIGINT/SIGTERM with a grace period for the in-flight cycle.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use cron::Schedule;
use notetally_common::types::ProviderKind;
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

use crate::config::AppConfig;
use crate::engine::{CycleOutcome, TodoEngine};
use crate::provider::{Backend, NoteProvider};
use crate::schedule::CycleScheduler;

/// Run the daemon until a shutdown signal arrives.
pub async fn run(config: AppConfig, provider: ProviderKind) -> Result<()> {
    config.validate(provider).context("invalid configuration")?;
    let schedule = config.cron_schedule()?;

    info!(%provider, app_id = %config.app_id, schedule = %config.schedule, "starting notetally daemon");
    let backend = Backend::connect(provider, &config).await?;
    let engine = TodoEngine::new(backend, config.engine_config());

    serve(engine, schedule, shutdown_signal(), config.timeouts.shutdown()).await
}

/// Run the scheduler until `shutdown` resolves, then give the in-flight
/// cycle up to `grace` to finish and release its lock.
pub async fn serve<P, F>(
    engine: TodoEngine<P>,
    schedule: Schedule,
    shutdown: F,
    grace: Duration,
) -> Result<()>
where
    P: NoteProvider,
    F: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task =
        tokio::spawn(CycleScheduler::new(engine, schedule).run(shutdown_rx).in_current_span());

    tokio::select! {
        _ = shutdown => {}
        result = &mut task => {
            result.context("scheduler task failed")?;
            warn!("scheduler stopped without a shutdown signal");
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(grace, &mut task).await {
        Ok(result) => {
            result.context("scheduler task failed")?;
            info!("daemon stopped");
        }
        Err(_) => {
            warn!(?grace, "in-flight cycle did not finish within the grace period");
            task.abort();
        }
    }
    Ok(())
}

/// Run a single cycle against the configured backend. Ctrl+C cancels it;
/// the lock is still released.
pub async fn run_once(config: &AppConfig, provider: ProviderKind) -> Result<CycleOutcome> {
    config.validate(provider).context("invalid configuration")?;
    let backend = Backend::connect(provider, config).await?;
    let mut engine = TodoEngine::new(backend, config.engine_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interrupt = tokio::spawn(
        async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        }
        .in_current_span(),
    );

    let result = engine.run_cycle(&shutdown_rx).await;
    interrupt.abort();
    Ok(result?)
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
