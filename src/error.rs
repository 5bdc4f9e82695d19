use thiserror::Error;

/// Reasons an [`ElectorConfig`](crate::elector::ElectorConfig) is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("identity is required")]
    EmptyIdentity,

    #[error("lock name is required")]
    EmptyLockName,

    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    #[error("retry period ({retry_ms}ms) must be shorter than the lease duration ({lease_ms}ms)")]
    RetryNotBelowLease { retry_ms: u128, lease_ms: u128 },

    #[error("renew deadline ({deadline_ms}ms) must not exceed the lease duration ({lease_ms}ms)")]
    DeadlineExceedsLease { deadline_ms: u128, lease_ms: u128 },
}

/// Failures reported by a [`LeaseStore`](crate::lease::LeaseStore).
///
/// The elector treats every variant as transient: the attempt failed for
/// this tick and is retried on the next one.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Lease store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid elector configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Elector is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;
