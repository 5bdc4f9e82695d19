//! Three in-process nodes compete for one lease in a shared memory store.
//! The leader is stopped after a while and a follower takes over.
//!
//! ```text
//! cargo run --example failover
//! ```

use std::sync::Arc;
use std::time::Duration;

use lis_elector::prelude::*;
use tracing::info;

fn callbacks(identity: &str) -> CallbackFns {
    let started = identity.to_string();
    let stopped = identity.to_string();
    let observer = identity.to_string();
    CallbackFns::new()
        .on_started_leading(move |lease: &LeaseRecord| {
            info!(identity = %started, term = lease.term, "BECAME LEADER")
        })
        .on_stopped_leading(move || info!(identity = %stopped, "LOST LEADERSHIP"))
        .on_new_leader(move |leader: &str| {
            info!(identity = %observer, leader, "New leader elected")
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = MemoryLeaseStore::new();
    let mut nodes = Vec::new();
    for i in 1..=3 {
        let identity = format!("node-{i}");
        let config = ElectorConfig::builder(identity.as_str())
            .lock_name("failover-demo")
            .lease_duration(Duration::from_secs(2))
            .retry_period(Duration::from_millis(400))
            .build()?;
        let elector = Arc::new(LeaderElector::new(
            config,
            Arc::new(store.clone()),
            Arc::new(callbacks(&identity)),
        )?);
        let runner = elector.clone();
        let task = tokio::spawn(async move { runner.run().await });
        nodes.push((elector, task));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for round in 1..=3 {
        tokio::time::sleep(Duration::from_secs(3)).await;

        let Some(index) = nodes.iter().position(|(elector, _)| elector.is_leader()) else {
            info!(round, "No leader yet");
            continue;
        };
        let (leader, task) = nodes.remove(index);
        info!(round, leader = leader.identity(), "Stopping the current leader");
        leader.stop();
        task.await??;

        if let Some(record) = store.peek("failover-demo") {
            info!(
                holder = %record.holder,
                term = record.term,
                released = record.is_released(),
                "Lease after stop"
            );
        }
        if nodes.is_empty() {
            break;
        }
    }

    for (elector, task) in nodes {
        elector.stop();
        task.await??;
    }
    info!("All nodes stopped");
    Ok(())
}
