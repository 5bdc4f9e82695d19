use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lis_elector::{CallbackFns, Cli, FileLeaseStore, LeaderElector};

/// Entrypoint: run one elector against the lock directory until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .init();

    let identity = cli.identity();
    let config = cli
        .elector_config(identity.clone())
        .context("invalid election settings")?;
    let lock_dir = cli.lock_dir();
    let store = FileLeaseStore::open(&lock_dir)
        .await
        .with_context(|| format!("cannot open lock directory {}", lock_dir.display()))?;

    info!(
        identity = %identity,
        lock = %config.lock_name,
        dir = %lock_dir.display(),
        lease_ms = config.lease_duration.as_millis() as u64,
        retry_ms = config.retry_period.as_millis() as u64,
        "Starting leader election node"
    );

    let callbacks = CallbackFns::new()
        .on_started_leading({
            let identity = identity.clone();
            move |lease: &lis_elector::LeaseRecord| {
                info!(
                    identity = %identity,
                    term = lease.term,
                    "BECAME LEADER - starting leadership duties"
                )
            }
        })
        .on_stopped_leading({
            let identity = identity.clone();
            move || info!(identity = %identity, "LOST LEADERSHIP - stepping down")
        })
        .on_new_leader({
            let identity = identity.clone();
            move |leader: &str| info!(identity = %identity, leader, "New leader elected")
        });

    let elector = Arc::new(LeaderElector::new(config, Arc::new(store), Arc::new(callbacks))?);

    let heartbeat = tokio::spawn({
        let elector = elector.clone();
        let period = cli.heartbeat();
        async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let status = elector.status();
                info!(
                    identity = %status.identity,
                    role = %status.role,
                    leader = status.holder.as_deref().unwrap_or("-"),
                    "Heartbeat"
                );
            }
        }
    });

    info!(identity = %identity, "Leader election started, press Ctrl+C to stop");
    elector.run_until(shutdown_signal()).await?;
    heartbeat.abort();

    info!(identity = %identity, "Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Cannot install signal handlers, falling back to Ctrl+C");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
