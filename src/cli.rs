use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::elector::config::DEFAULT_LOCK_NAME;
use crate::elector::ElectorConfig;
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(
    name = "lis-elector",
    version,
    about = "Lease-based leader election node",
    long_about = None
)]
pub struct Cli {
    /// Unique identity of this node; generated from host and pid when omitted
    #[arg(long)]
    pub identity: Option<String>,

    /// Name of the lease slot to compete for
    #[arg(long, default_value = DEFAULT_LOCK_NAME)]
    pub lock_name: String,

    /// Directory holding lock files (defaults to the system temp dir)
    #[arg(long, value_parser)]
    pub lock_dir: Option<PathBuf>,

    /// How long a renewal stays valid, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub lease_ms: u64,

    /// Upper bound on one store call, in milliseconds (default: 80% of the lease)
    #[arg(long)]
    pub renew_deadline_ms: Option<u64>,

    /// Polling and renewal cadence, in milliseconds (default: 20% of the lease)
    #[arg(long)]
    pub retry_ms: Option<u64>,

    /// How often to print the status line, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub heartbeat_ms: u64,

    /// Leave the lock file in place on shutdown and let it expire
    #[arg(long)]
    pub keep_lease: bool,

    /// Verbose mode (-v, -vv)
    #[arg(short, action = ArgAction::Count)]
    pub verbosity: u8,
}

impl Cli {
    pub fn identity(&self) -> String {
        self.identity.clone().unwrap_or_else(generate_identity)
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }

    pub fn elector_config(&self, identity: String) -> Result<ElectorConfig, ConfigError> {
        let mut builder = ElectorConfig::builder(identity)
            .lock_name(self.lock_name.clone())
            .lease_duration(Duration::from_millis(self.lease_ms))
            .release_on_stop(!self.keep_lease);
        if let Some(ms) = self.renew_deadline_ms {
            builder = builder.renew_deadline(Duration::from_millis(ms));
        }
        if let Some(ms) = self.retry_ms {
            builder = builder.retry_period(Duration::from_millis(ms));
        }
        builder.build()
    }

    /// Log filter for the given verbosity, used when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// `node-<host>-<pid>-<random>`, unique enough to tell peers apart.
pub fn generate_identity() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("node-{host}-{}-{}", std::process::id(), &suffix[..8])
}
