//! Lease-based leader election.
//!
//! Several processes compete for one named lease slot in a shared
//! [`LeaseStore`]. Whoever holds an unexpired lease is leader and keeps it
//! by renewing every retry period; when it stops renewing, a peer takes
//! over once the lease has expired.
//!
//! Mutual exclusion is best-effort. It relies on the store's exclusive
//! create and conditional replace, and on clocks that roughly agree. Every
//! acquisition carries a monotonically increasing `term` that downstream
//! systems can use as a fencing token.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lis_elector::prelude::*;
//!
//! # async fn demo() -> lis_elector::Result<()> {
//! let store = Arc::new(FileLeaseStore::open("/tmp").await?);
//! let callbacks = CallbackFns::new()
//!     .on_started_leading(|lease| println!("leading, term {}", lease.term))
//!     .on_stopped_leading(|| println!("stepped down"));
//!
//! let elector = Arc::new(LeaderElector::new(
//!     ElectorConfig::new("node-1")?,
//!     store,
//!     Arc::new(callbacks),
//! )?);
//!
//! let runner = elector.clone();
//! tokio::spawn(async move { runner.run().await });
//! // ...
//! elector.stop();
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod elector;
pub mod error;
pub mod lease;
pub mod prelude;

mod cli;
pub use cli::{generate_identity, Cli};

pub use clock::{Clock, MockClock, SystemClock, Timestamp};
pub use elector::{
    CallbackFns, ElectorConfig, ElectorStatus, LeaderCallbacks, LeaderElector, NoopCallbacks, Role,
};
pub use error::{ConfigError, Error, Result, StoreError};
pub use lease::{FileLeaseStore, LeaseRecord, LeaseStore, MemoryLeaseStore};
