use crate::lease::LeaseRecord;
use std::fmt;

/// Handlers invoked on role transitions.
///
/// All methods run on the elector's driving task, one at a time, and
/// block it until they return. A handler may call
/// [`LeaderElector::stop`](super::LeaderElector::stop); that only raises the
/// cancellation signal and never re-enters a callback.
pub trait LeaderCallbacks: Send + Sync {
    /// Leadership was acquired. `lease.term` increases with every
    /// acquisition and can be handed to downstream writers as a fencing
    /// token.
    fn on_started_leading(&self, lease: &LeaseRecord) {
        let _ = lease;
    }

    /// Leadership held by this elector ended: expiry, renewal failures
    /// outlasting the lease, takeover by a peer, or a graceful stop.
    fn on_stopped_leading(&self) {}

    /// Another participant was observed holding the lease.
    fn on_new_leader(&self, identity: &str) {
        let _ = identity;
    }
}

/// Callbacks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl LeaderCallbacks for NoopCallbacks {}

type StartedFn = Box<dyn Fn(&LeaseRecord) + Send + Sync>;
type StoppedFn = Box<dyn Fn() + Send + Sync>;
type NewLeaderFn = Box<dyn Fn(&str) + Send + Sync>;

/// [`LeaderCallbacks`] assembled from closures, one named slot per event.
///
/// ```
/// use lis_elector::CallbackFns;
///
/// let callbacks = CallbackFns::new()
///     .on_started_leading(|lease| println!("leading in term {}", lease.term))
///     .on_stopped_leading(|| println!("stepped down"));
/// ```
#[derive(Default)]
pub struct CallbackFns {
    started: Option<StartedFn>,
    stopped: Option<StoppedFn>,
    new_leader: Option<NewLeaderFn>,
}

impl CallbackFns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_started_leading(mut self, f: impl Fn(&LeaseRecord) + Send + Sync + 'static) -> Self {
        self.started = Some(Box::new(f));
        self
    }

    pub fn on_stopped_leading(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.stopped = Some(Box::new(f));
        self
    }

    pub fn on_new_leader(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.new_leader = Some(Box::new(f));
        self
    }
}

impl LeaderCallbacks for CallbackFns {
    fn on_started_leading(&self, lease: &LeaseRecord) {
        if let Some(f) = &self.started {
            f(lease);
        }
    }

    fn on_stopped_leading(&self) {
        if let Some(f) = &self.stopped {
            f();
        }
    }

    fn on_new_leader(&self, identity: &str) {
        if let Some(f) = &self.new_leader {
            f(identity);
        }
    }
}

impl fmt::Debug for CallbackFns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackFns")
            .field("on_started_leading", &self.started.is_some())
            .field("on_stopped_leading", &self.stopped.is_some())
            .field("on_new_leader", &self.new_leader.is_some())
            .finish()
    }
}
