// Lease record persisted in the shared store

use crate::clock::{elapsed_between, truncate_millis, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The value held in a lease slot: who holds it and when they last renewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Identity of the process claiming the lease
    pub holder: String,

    /// Last successful acquisition or renewal
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub renewed_at: Timestamp,

    /// When the current holder first acquired the lease
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub acquired_at: Timestamp,

    /// Bumped every time the lease is (re)acquired; usable as a fencing token
    #[serde(default)]
    pub term: u64,
}

impl LeaseRecord {
    /// Create a freshly acquired record.
    pub fn new(holder: impl Into<String>, now: Timestamp, term: u64) -> Self {
        let now = truncate_millis(now);
        Self {
            holder: holder.into(),
            renewed_at: now,
            acquired_at: now,
            term,
        }
    }

    /// The record a holder writes to claim the lease after `previous`.
    pub fn succeeding(previous: Option<&LeaseRecord>, holder: &str, now: Timestamp) -> Self {
        let term = previous.map_or(0, |record| record.term) + 1;
        Self::new(holder, now, term)
    }

    /// Same holder and term, renewed at `now`.
    pub fn renewed(&self, now: Timestamp) -> Self {
        Self {
            renewed_at: truncate_millis(now),
            ..self.clone()
        }
    }

    /// Same holder and term, stamped as expired long ago. Written on a
    /// graceful stop so the slot frees up at once while `term` survives for
    /// the next holder.
    pub fn released(&self) -> Self {
        Self {
            renewed_at: Timestamp::UNIX_EPOCH,
            ..self.clone()
        }
    }

    pub fn is_released(&self) -> bool {
        self.renewed_at == Timestamp::UNIX_EPOCH
    }

    pub fn is_held_by(&self, identity: &str) -> bool {
        self.holder == identity
    }

    /// Valid while `now - renewed_at <= lease_duration`.
    pub fn is_expired(&self, now: Timestamp, lease_duration: Duration) -> bool {
        elapsed_between(self.renewed_at, now) > lease_duration
    }

    /// Time remaining until expiration
    pub fn time_remaining(&self, now: Timestamp, lease_duration: Duration) -> Option<Duration> {
        lease_duration.checked_sub(elapsed_between(self.renewed_at, now))
            .filter(|remaining| !remaining.is_zero())
    }
}

impl std::fmt::Display for LeaseRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (term {}, renewed {})",
            self.holder,
            self.term,
            self.renewed_at.timestamp_millis()
        )
    }
}
