// Wall-clock abstraction used by the elector.
//
// Lease validity is judged against `Clock::now()` and the driving loop
// waits on `Clock::sleep()`, so swapping the clock is enough to run an
// election on virtual time.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub type Timestamp = DateTime<Utc>;

#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time.
    fn now(&self) -> Timestamp;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Drops sub-millisecond precision so a timestamp survives any backend
/// encoding that stores milliseconds.
pub fn truncate_millis(ts: Timestamp) -> Timestamp {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Time elapsed from `earlier` to `now`, clamped at zero when `earlier` lies
/// in the future (e.g. a record written by a peer whose clock runs ahead).
pub fn elapsed_between(earlier: Timestamp, now: Timestamp) -> Duration {
    (now - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// The real system clock, sleeping on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that follows the tokio timer instead of the OS clock.
///
/// Under a paused runtime (`#[tokio::test(start_paused = true)]`) time only
/// moves when every task is idle, which makes elections deterministic. An
/// extra offset simulates skew between peers or a jump after a VM pause.
#[derive(Debug)]
pub struct MockClock {
    anchor: Timestamp,
    started: tokio::time::Instant,
    offset_ms: AtomicI64,
}

impl MockClock {
    pub fn new() -> Self {
        Self::starting_at(truncate_millis(Utc::now()))
    }

    pub fn starting_at(anchor: Timestamp) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Same timeline as `self` but running `skew_ms` ahead (or behind, if
    /// negative). Useful for giving competing electors disagreeing clocks.
    pub fn skewed(&self, skew_ms: i64) -> Self {
        Self {
            anchor: self.anchor,
            started: self.started,
            offset_ms: AtomicI64::new(self.offset_ms.load(Ordering::SeqCst) + skew_ms),
        }
    }

    /// Jumps the wall clock forward without waking any sleeper.
    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::zero());
        self.anchor + elapsed + TimeDelta::milliseconds(self.offset_ms.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_millis_drops_sub_millisecond_part() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let truncated = truncate_millis(ts);
        assert_eq!(truncated.timestamp_millis(), ts.timestamp_millis());
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_elapsed_between_clamps_future_timestamps() {
        let now = Utc::now();
        let future = now + TimeDelta::seconds(5);
        assert_eq!(elapsed_between(future, now), Duration::ZERO);
        assert_eq!(elapsed_between(now, future), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_clock_follows_paused_timer() {
        let anchor = DateTime::from_timestamp_millis(1_000_000).unwrap();
        let clock = MockClock::starting_at(anchor);
        assert_eq!(clock.now(), anchor);

        clock.sleep(Duration::from_millis(250)).await;
        assert_eq!(clock.now(), anchor + TimeDelta::milliseconds(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_clock_advance_and_skew() {
        let anchor = DateTime::from_timestamp_millis(1_000_000).unwrap();
        let clock = MockClock::starting_at(anchor);

        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now(), anchor + TimeDelta::seconds(3));

        let behind = clock.skewed(-5_000);
        assert_eq!(behind.now(), anchor - TimeDelta::seconds(2));
        assert_eq!(behind.offset_ms(), -2_000);
    }

    #[tokio::test]
    async fn test_system_clock_tracks_utc() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
        assert!(elapsed_between(before, now) < Duration::from_secs(1));
    }
}
