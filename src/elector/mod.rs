// Lease-based leader election
//
// Each participant runs one `LeaderElector` against a shared lease slot.
// Every retry period the driving loop performs one step:
// - Follower: read the slot; claim it if empty, expired or already ours
// - Leader: renew the slot; step down once the lease can no longer be
//   proven valid
// The store's exclusive create and conditional replace decide who wins.

pub mod callbacks;
pub mod config;
pub mod state;

pub use callbacks::{CallbackFns, LeaderCallbacks, NoopCallbacks};
pub use config::{ElectorConfig, ElectorConfigBuilder};
pub use state::{ElectorStatus, Role};

use crate::clock::{elapsed_between, Clock, SystemClock, Timestamp};
use crate::error::{Error, Result};
use crate::lease::{LeaseRecord, LeaseStore, StoreResult};
use parking_lot::Mutex;
use state::ElectorState;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct LeaderElector {
    config: ElectorConfig,
    store: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    callbacks: Arc<dyn LeaderCallbacks>,
    state: Mutex<ElectorState>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl LeaderElector {
    /// Create an elector. Fails if `config` is invalid.
    pub fn new(
        config: ElectorConfig,
        store: Arc<dyn LeaseStore>,
        callbacks: Arc<dyn LeaderCallbacks>,
    ) -> Result<Self> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            callbacks,
            state: Mutex::new(ElectorState::new()),
            shutdown,
            running: AtomicBool::new(false),
        })
    }

    /// Replace the system clock, e.g. with a `MockClock` in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    pub fn config(&self) -> &ElectorConfig {
        &self.config
    }

    pub fn is_leader(&self) -> bool {
        self.state.lock().role == Role::Leader
    }

    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    /// Last known lease holder; may be stale by up to one retry period.
    pub fn leader(&self) -> Option<String> {
        self.state
            .lock()
            .last_known
            .as_ref()
            .filter(|record| !record.is_released())
            .map(|record| record.holder.clone())
    }

    pub fn status(&self) -> ElectorStatus {
        self.state.lock().snapshot(&self.config.identity)
    }

    /// Ask the driving loop to exit and release the lease.
    ///
    /// Idempotent, and safe to call before `run`, from another task, or from
    /// inside a callback. The loop notices within one retry period; a store
    /// call already in flight is allowed to finish first.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!(identity = %self.config.identity, "Stop requested");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Drive the election until [`stop`](Self::stop) is called.
    ///
    /// Transient store failures never end the loop. May be called once per
    /// elector; later calls return `Error::AlreadyRunning`.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }
        let mut shutdown = self.shutdown.subscribe();

        info!(
            identity = %self.config.identity,
            lock = %self.config.lock_name,
            store = self.store.kind(),
            lease_ms = self.config.lease_duration.as_millis() as u64,
            retry_ms = self.config.retry_period.as_millis() as u64,
            "Starting leader election"
        );

        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }

            self.tick().await;

            tokio::select! {
                () = self.clock.sleep(self.config.retry_period) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.release().await;
        Ok(())
    }

    /// Like [`run`](Self::run), stopping once `signal` resolves.
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let run = self.run();
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => result,
            () = signal => {
                self.stop();
                run.await
            }
        }
    }

    /// Perform a single election step.
    ///
    /// `run` calls this once per retry period. It is public for custom
    /// schedulers and step-by-step tests, and must not be called while `run`
    /// is driving the same elector.
    pub async fn tick(&self) {
        let role = self.state.lock().role;
        match role {
            Role::Follower => self.try_acquire().await,
            Role::Leader => self.renew().await,
            Role::Stopped => {}
        }
    }

    async fn try_acquire(&self) {
        let lock_name = &self.config.lock_name;
        let identity = &self.config.identity;

        let Some(observed) = self.bounded("read", self.store.read(lock_name)).await else {
            return;
        };
        let now = self.clock.now();

        let acquired = match observed {
            None => {
                let previous = self.state.lock().last_known.clone();
                let claim = LeaseRecord::succeeding(previous.as_ref(), identity, now);
                self.bounded("create", self.store.try_create(lock_name, &claim))
                    .await
                    .and_then(|created| created.then_some(claim))
            }
            Some(current)
                if current.is_held_by(identity)
                    || current.is_expired(now, self.config.lease_duration) =>
            {
                if current.is_held_by(identity) {
                    info!(
                        identity = %identity,
                        term = current.term,
                        "Found lease under our identity, reclaiming"
                    );
                } else if current.is_released() {
                    info!(
                        identity = %identity,
                        holder = %current.holder,
                        "Found released lease, attempting to acquire"
                    );
                } else {
                    info!(
                        identity = %identity,
                        holder = %current.holder,
                        "Found expired lease, attempting to acquire"
                    );
                }
                let claim = LeaseRecord::succeeding(Some(&current), identity, now);
                let replaced = self
                    .bounded("replace", self.store.replace(lock_name, &current, &claim))
                    .await;
                self.state.lock().last_known = Some(current);
                replaced.and_then(|replaced| replaced.then_some(claim))
            }
            Some(current) => {
                let changed = {
                    let mut state = self.state.lock();
                    let changed = state.observe_leader(&current.holder);
                    state.last_known = Some(current.clone());
                    changed
                };
                if changed {
                    info!(
                        identity = %identity,
                        leader = %current.holder,
                        term = current.term,
                        "New leader observed"
                    );
                    self.callbacks.on_new_leader(&current.holder);
                }
                None
            }
        };

        match acquired {
            Some(record) => self.become_leader(record, now),
            None => debug!(identity = %identity, "Lease not acquired this round"),
        }
    }

    async fn renew(&self) {
        let lock_name = &self.config.lock_name;
        let cached = self.state.lock().last_known.clone();
        let Some(current) = cached else {
            warn!(identity = %self.config.identity, "Leading without a cached lease record");
            self.lose_leadership();
            return;
        };

        let now = self.clock.now();
        let renewed = current.renewed(now);
        match self
            .bounded("renew", self.store.replace(lock_name, &current, &renewed))
            .await
        {
            Some(true) => {
                let mut state = self.state.lock();
                if state.failed_renewals > 0 {
                    info!(
                        identity = %self.config.identity,
                        failed = state.failed_renewals,
                        "Lease renewal recovered"
                    );
                }
                state.last_known = Some(renewed);
                state.last_renewal = Some(now);
                state.failed_renewals = 0;
            }
            Some(false) => self.handle_renew_conflict(&current).await,
            None => self.handle_renew_failure(),
        }
    }

    /// The slot no longer holds the record we last wrote. Either a peer took
    /// over, or an earlier renewal landed after its deadline.
    async fn handle_renew_conflict(&self, expected: &LeaseRecord) {
        let identity = &self.config.identity;
        let stored = self
            .bounded("read", self.store.read(&self.config.lock_name))
            .await;

        match stored {
            Some(Some(record))
                if record.is_held_by(identity) && record.term == expected.term =>
            {
                debug!(identity = %identity, "Adopting late renewal found in the store");
                self.state.lock().last_known = Some(record);
                self.handle_renew_failure();
            }
            Some(record) => {
                warn!(
                    identity = %identity,
                    holder = record.as_ref().map(|r| r.holder.as_str()).unwrap_or("<none>"),
                    "Lease was taken over, stepping down"
                );
                self.state.lock().last_known = record;
                self.lose_leadership();
            }
            None => self.handle_renew_failure(),
        }
    }

    fn handle_renew_failure(&self) {
        let (failed, expired) = {
            let mut state = self.state.lock();
            state.failed_renewals += 1;
            let expired = state.last_renewal.map_or(true, |at| {
                elapsed_between(at, self.clock.now()) > self.config.lease_duration
            });
            (state.failed_renewals, expired)
        };

        if expired {
            warn!(
                identity = %self.config.identity,
                failed,
                "Lease validity window elapsed without renewal, stepping down"
            );
            self.lose_leadership();
        } else {
            warn!(identity = %self.config.identity, failed, "Failed to renew lease, will retry");
        }
    }

    fn become_leader(&self, record: LeaseRecord, acquired_at: Timestamp) {
        info!(
            identity = %self.config.identity,
            term = record.term,
            "Successfully acquired leadership"
        );
        // Callback first: nobody sees us as leader before it has run
        self.callbacks.on_started_leading(&record);
        self.state.lock().lead(record, acquired_at);
    }

    fn lose_leadership(&self) {
        let was_leader = self.state.lock().step_down();
        if was_leader {
            info!(identity = %self.config.identity, "Stopped leading");
            self.callbacks.on_stopped_leading();
        }
    }

    /// Final step of `run`: give up the lease if we hold it, then go to
    /// `Stopped`. Release is best-effort; if the store is unreachable the
    /// lease simply expires.
    async fn release(&self) {
        let held = {
            let mut state = self.state.lock();
            let held = (state.role == Role::Leader)
                .then(|| state.last_known.clone())
                .flatten();
            let was_leader = state.step_down();
            state.role = Role::Stopped;
            was_leader.then_some(held).flatten()
        };

        if let Some(record) = held {
            if self.config.release_on_stop {
                self.release_slot(&record).await;
            }
            info!(identity = %self.config.identity, "Stopped leading on shutdown");
            self.callbacks.on_stopped_leading();
        }
        info!(identity = %self.config.identity, "Leader election stopped");
    }

    /// Marks our record as released instead of deleting it, so the next
    /// holder continues from our term.
    async fn release_slot(&self, record: &LeaseRecord) {
        let identity = &self.config.identity;
        let released = record.released();
        let replaced = self
            .bounded(
                "release",
                self.store.replace(&self.config.lock_name, record, &released),
            )
            .await;
        match replaced {
            Some(true) => {
                info!(identity = %identity, term = record.term, "Released lease");
                self.state.lock().last_known = Some(released);
            }
            Some(false) => debug!(identity = %identity, "Lease no longer ours, nothing to release"),
            None => warn!(identity = %identity, "Could not release lease, leaving it to expire"),
        }
    }

    /// Runs a store call bounded by the renew deadline. Errors and timeouts
    /// are logged and collapse to `None`.
    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.config.renew_deadline, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(identity = %self.config.identity, op, error = %e, "Lease store call failed");
                None
            }
            Err(_) => {
                warn!(
                    identity = %self.config.identity,
                    op,
                    deadline_ms = self.config.renew_deadline.as_millis() as u64,
                    "Lease store call timed out"
                );
                None
            }
        }
    }
}

impl fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderElector")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("clock", &self.clock)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
