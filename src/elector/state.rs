// Elector role and the in-memory state guarded by the elector's mutex

use crate::clock::Timestamp;
use crate::lease::LeaseRecord;
use serde::Serialize;

/// Current role of an elector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Not holding the lease; polling for a chance to acquire it
    Follower,
    /// Holding the lease and renewing it
    Leader,
    /// Terminal; the driving loop has exited
    Stopped,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "FOLLOWER"),
            Role::Leader => write!(f, "LEADER"),
            Role::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ElectorState {
    pub role: Role,

    /// Cached copy of the slot; may be stale between polls
    pub last_known: Option<LeaseRecord>,

    /// Local time of our last successful acquire or renew
    pub last_renewal: Option<Timestamp>,

    /// Consecutive failed renewal attempts while leading
    pub failed_renewals: u32,

    /// Holder last reported through `on_new_leader`
    pub observed_leader: Option<String>,
}

impl ElectorState {
    pub fn new() -> Self {
        Self {
            role: Role::Follower,
            last_known: None,
            last_renewal: None,
            failed_renewals: 0,
            observed_leader: None,
        }
    }

    /// Records a successful acquisition of `record` at `now`.
    pub fn lead(&mut self, record: LeaseRecord, now: Timestamp) {
        self.role = Role::Leader;
        self.observed_leader = Some(record.holder.clone());
        self.last_known = Some(record);
        self.last_renewal = Some(now);
        self.failed_renewals = 0;
    }

    /// Drops back to follower. Returns whether we were leading.
    pub fn step_down(&mut self) -> bool {
        let was_leader = self.role == Role::Leader;
        if was_leader {
            self.role = Role::Follower;
        }
        self.last_renewal = None;
        self.failed_renewals = 0;
        was_leader
    }

    /// Notes `holder` as the observed leader. Returns true if it changed.
    pub fn observe_leader(&mut self, holder: &str) -> bool {
        if self.observed_leader.as_deref() == Some(holder) {
            return false;
        }
        self.observed_leader = Some(holder.to_string());
        true
    }

    pub fn snapshot(&self, identity: &str) -> ElectorStatus {
        ElectorStatus {
            identity: identity.to_string(),
            role: self.role,
            holder: self
                .last_known
                .as_ref()
                .filter(|r| !r.is_released())
                .map(|r| r.holder.clone()),
            term: self.last_known.as_ref().map(|r| r.term),
            renewed_at: self.last_known.as_ref().map(|r| r.renewed_at),
        }
    }
}

/// Read-only view of an elector for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectorStatus {
    pub identity: String,
    pub role: Role,
    /// Last known holder of the lease, possibly stale
    pub holder: Option<String>,
    pub term: Option<u64>,
    pub renewed_at: Option<Timestamp>,
}

impl ElectorStatus {
    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }
}
