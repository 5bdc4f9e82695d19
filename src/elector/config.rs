use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Default lease duration (10 seconds)
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10);

/// Default renew deadline (80% of the default lease)
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(8);

/// Default retry period (2 seconds)
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

pub const DEFAULT_LOCK_NAME: &str = "leader-election-demo";

/// Settings for one [`LeaderElector`](super::LeaderElector).
///
/// Durations are (de)serialized as milliseconds. A deserialized config is
/// checked again when the elector is built, so an invalid file can never
/// start an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectorConfig {
    /// Unique identity of this participant
    pub identity: String,

    /// Which lease slot in the store to compete for
    #[serde(default = "default_lock_name")]
    pub lock_name: String,

    /// How long a renewal stays valid
    #[serde(default = "default_lease_duration", with = "duration_ms")]
    pub lease_duration: Duration,

    /// Upper bound on a single store call
    #[serde(default = "default_renew_deadline", with = "duration_ms")]
    pub renew_deadline: Duration,

    /// Polling and renewal cadence
    #[serde(default = "default_retry_period", with = "duration_ms")]
    pub retry_period: Duration,

    /// Delete the lease slot on graceful stop so a peer can take over at once
    #[serde(default = "default_release_on_stop")]
    pub release_on_stop: bool,
}

impl ElectorConfig {
    /// Default settings for `identity`, validated.
    pub fn new(identity: impl Into<String>) -> Result<Self, ConfigError> {
        Self::builder(identity).build()
    }

    pub fn builder(identity: impl Into<String>) -> ElectorConfigBuilder {
        ElectorConfigBuilder {
            identity: identity.into(),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: None,
            retry_period: None,
            release_on_stop: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.trim().is_empty() {
            return Err(ConfigError::EmptyIdentity);
        }
        if self.lock_name.trim().is_empty() {
            return Err(ConfigError::EmptyLockName);
        }
        for (name, value) in [
            ("lease_duration", self.lease_duration),
            ("renew_deadline", self.renew_deadline),
            ("retry_period", self.retry_period),
        ] {
            if value.is_zero() {
                return Err(ConfigError::NonPositive(name));
            }
        }
        if self.renew_deadline > self.lease_duration {
            return Err(ConfigError::DeadlineExceedsLease {
                deadline_ms: self.renew_deadline.as_millis(),
                lease_ms: self.lease_duration.as_millis(),
            });
        }
        if self.retry_period >= self.lease_duration {
            return Err(ConfigError::RetryNotBelowLease {
                retry_ms: self.retry_period.as_millis(),
                lease_ms: self.lease_duration.as_millis(),
            });
        }
        if self.renew_deadline <= self.retry_period {
            warn!(
                identity = %self.identity,
                renew_deadline_ms = self.renew_deadline.as_millis() as u64,
                retry_period_ms = self.retry_period.as_millis() as u64,
                "Renew deadline is not longer than the retry period"
            );
        }
        Ok(())
    }
}

/// Builder for [`ElectorConfig`].
///
/// Unset timings follow the lease duration: the renew deadline defaults to
/// 80% of it and the retry period to 20%, which gives the 10s/8s/2s
/// defaults for the default lease.
#[derive(Debug, Clone)]
pub struct ElectorConfigBuilder {
    identity: String,
    lock_name: String,
    lease_duration: Duration,
    renew_deadline: Option<Duration>,
    retry_period: Option<Duration>,
    release_on_stop: bool,
}

impl ElectorConfigBuilder {
    pub fn lock_name(mut self, lock_name: impl Into<String>) -> Self {
        self.lock_name = lock_name.into();
        self
    }

    pub fn lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn renew_deadline(mut self, renew_deadline: Duration) -> Self {
        self.renew_deadline = Some(renew_deadline);
        self
    }

    pub fn retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = Some(retry_period);
        self
    }

    pub fn release_on_stop(mut self, release_on_stop: bool) -> Self {
        self.release_on_stop = release_on_stop;
        self
    }

    pub fn build(self) -> Result<ElectorConfig, ConfigError> {
        let config = ElectorConfig {
            renew_deadline: self
                .renew_deadline
                .unwrap_or_else(|| self.lease_duration * 4 / 5),
            retry_period: self
                .retry_period
                .unwrap_or_else(|| self.lease_duration / 5),
            identity: self.identity,
            lock_name: self.lock_name,
            lease_duration: self.lease_duration,
            release_on_stop: self.release_on_stop,
        };
        config.validate()?;
        Ok(config)
    }
}

fn default_lock_name() -> String {
    DEFAULT_LOCK_NAME.to_string()
}

fn default_lease_duration() -> Duration {
    DEFAULT_LEASE_DURATION
}

fn default_renew_deadline() -> Duration {
    DEFAULT_RENEW_DEADLINE
}

fn default_retry_period() -> Duration {
    DEFAULT_RETRY_PERIOD
}

fn default_release_on_stop() -> bool {
    true
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
