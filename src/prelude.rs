pub use std::{
    sync::Arc,
    time::Duration,
};

pub use crate::clock::{Clock, MockClock, SystemClock, Timestamp};
pub use crate::elector::{
    CallbackFns, ElectorConfig, ElectorStatus, LeaderCallbacks, LeaderElector, NoopCallbacks, Role,
};
pub use crate::error::{ConfigError, Error, Result, StoreError};
pub use crate::lease::{FileLeaseStore, LeaseRecord, LeaseStore, MemoryLeaseStore};

/// Lock name used when none is configured.
pub use crate::elector::config::DEFAULT_LOCK_NAME;
