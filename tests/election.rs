use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lis_elector::lease::StoreResult;
use lis_elector::prelude::*;
use tokio::time::sleep;

const LEASE: Duration = Duration::from_millis(200);
const RETRY: Duration = Duration::from_millis(50);

/// Counts every callback invocation for one participant
#[derive(Debug, Default)]
struct Recorder {
    started: AtomicUsize,
    stopped: AtomicUsize,
    new_leader: AtomicUsize,
}

impl Recorder {
    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    fn new_leader(&self) -> usize {
        self.new_leader.load(Ordering::SeqCst)
    }
}

impl LeaderCallbacks for Recorder {
    fn on_started_leading(&self, _lease: &LeaseRecord) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stopped_leading(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn on_new_leader(&self, _identity: &str) {
        self.new_leader.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store wrapper that can be cut off from one participant only
#[derive(Debug)]
struct Partitioned {
    inner: MemoryLeaseStore,
    cut: AtomicBool,
}

impl Partitioned {
    fn new(inner: &MemoryLeaseStore) -> Self {
        Self {
            inner: inner.clone(),
            cut: AtomicBool::new(false),
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.cut.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("partitioned".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for Partitioned {
    fn kind(&self) -> &'static str {
        "partitioned"
    }

    async fn try_create(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<bool> {
        self.check()?;
        self.inner.try_create(lock_name, record).await
    }

    async fn read(&self, lock_name: &str) -> StoreResult<Option<LeaseRecord>> {
        self.check()?;
        self.inner.read(lock_name).await
    }

    async fn update(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<()> {
        self.check()?;
        self.inner.update(lock_name, record).await
    }

    async fn delete(&self, lock_name: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete(lock_name).await
    }

    async fn replace(
        &self,
        lock_name: &str,
        expected: &LeaseRecord,
        record: &LeaseRecord,
    ) -> StoreResult<bool> {
        self.check()?;
        self.inner.replace(lock_name, expected, record).await
    }
}

fn config(identity: &str) -> ElectorConfig {
    ElectorConfig::builder(identity)
        .lock_name("election")
        .lease_duration(LEASE)
        .retry_period(RETRY)
        .build()
        .unwrap()
}

fn participant(
    identity: &str,
    store: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
) -> (Arc<LeaderElector>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let elector = LeaderElector::new(config(identity), store, recorder.clone())
        .unwrap()
        .with_clock(clock);
    (Arc::new(elector), recorder)
}

fn spawn_run(elector: &Arc<LeaderElector>) -> tokio::task::JoinHandle<Result<()>> {
    let elector = elector.clone();
    tokio::spawn(async move { elector.run().await })
}

#[tokio::test(start_paused = true)]
async fn test_failover_after_leader_crash() {
    let store = MemoryLeaseStore::new();
    let clock = Arc::new(MockClock::new());
    let (a, a_calls) = participant("node-a", Arc::new(store.clone()), clock.clone());
    let (b, b_calls) = participant("node-b", Arc::new(store.clone()), clock.clone());

    let a_task = spawn_run(&a);
    sleep(Duration::from_millis(10)).await;
    let b_task = spawn_run(&b);

    sleep(Duration::from_millis(500)).await;
    assert!(a.is_leader());
    assert!(!b.is_leader());
    assert_eq!(b.leader().as_deref(), Some("node-a"));
    assert_eq!(store.peek("election").unwrap().term, 1);

    // Crash: no release, no callback
    a_task.abort();
    let _ = a_task.await;

    sleep(LEASE + RETRY * 2).await;
    assert!(b.is_leader());
    let record = store.peek("election").unwrap();
    assert_eq!(record.holder, "node-b");
    assert_eq!(record.term, 2);

    assert_eq!(a_calls.started(), 1);
    assert_eq!(a_calls.stopped(), 0);
    assert_eq!(b_calls.started(), 1);
    assert_eq!(b_calls.stopped(), 0);
    assert_eq!(a_calls.started() + b_calls.started(), 2);

    b.stop();
    b_task.await.unwrap().unwrap();
    assert_eq!(b.role(), Role::Stopped);
    assert_eq!(b_calls.stopped(), 1);
    let record = store.peek("election").unwrap();
    assert!(record.is_released());
    assert_eq!(record.term, 2);
}

#[tokio::test(start_paused = true)]
async fn test_graceful_handover() {
    let store = MemoryLeaseStore::new();
    let clock = Arc::new(MockClock::new());
    let (a, a_calls) = participant("node-a", Arc::new(store.clone()), clock.clone());
    let (b, b_calls) = participant("node-b", Arc::new(store.clone()), clock.clone());

    let a_task = spawn_run(&a);
    sleep(Duration::from_millis(10)).await;
    let b_task = spawn_run(&b);
    sleep(Duration::from_millis(100)).await;
    assert!(a.is_leader());

    a.stop();
    a_task.await.unwrap().unwrap();
    assert_eq!(a_calls.stopped(), 1);

    // The slot was released, so no need to wait out the lease
    sleep(RETRY * 2).await;
    assert!(b.is_leader());
    assert_eq!(b_calls.started(), 1);
    assert_eq!(store.peek("election").unwrap().term, 2);

    b.stop();
    b_task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_leader_keeps_lease_while_renewing() {
    let store = MemoryLeaseStore::new();
    let clock = Arc::new(MockClock::new());
    let (a, a_calls) = participant("node-a", Arc::new(store.clone()), clock.clone());
    let (b, b_calls) = participant("node-b", Arc::new(store.clone()), clock.clone());

    let a_task = spawn_run(&a);
    sleep(Duration::from_millis(10)).await;
    let b_task = spawn_run(&b);

    // Many lease durations
    for _ in 0..40 {
        sleep(RETRY).await;
        assert!(a.is_leader());
        assert!(!b.is_leader());
    }
    assert_eq!(a_calls.started(), 1);
    assert_eq!(a_calls.stopped(), 0);
    assert_eq!(b_calls.started(), 0);
    assert_eq!(store.peek("election").unwrap().term, 1);

    a.stop();
    b.stop();
    a_task.await.unwrap().unwrap();
    b_task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_leader() {
    let store = MemoryLeaseStore::new();
    let clock = Arc::new(MockClock::new());
    let mut electors = Vec::new();
    let mut tasks = Vec::new();
    for i in 0..5 {
        let identity = format!("node-{i}");
        let (elector, _) = participant(&identity, Arc::new(store.clone()), clock.clone());
        tasks.push(spawn_run(&elector));
        electors.push(elector);
    }

    for round in 0..40 {
        sleep(Duration::from_millis(25)).await;
        let leaders = electors.iter().filter(|e| e.is_leader()).count();
        assert!(leaders <= 1, "{leaders} leaders in round {round}");

        // Knock out whoever leads now and then
        if round % 10 == 5 {
            if let Some(leader) = electors.iter().find(|e| e.is_leader()) {
                leader.stop();
            }
        }
    }

    for elector in &electors {
        elector.stop();
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert!(store.peek("election").unwrap().is_released());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_leader_cannot_overwrite_successor() {
    let store = MemoryLeaseStore::new();
    let b_clock = Arc::new(MockClock::new());
    // A's clock lags, so it still believes in its lease after B took over
    let a_clock = Arc::new(b_clock.skewed(-150));
    let a_store = Arc::new(Partitioned::new(&store));
    let (a, a_calls) = participant("node-a", a_store.clone(), a_clock);
    let (b, b_calls) = participant("node-b", Arc::new(store.clone()), b_clock);

    a.tick().await;
    assert!(a.is_leader());

    a_store.cut.store(true, Ordering::SeqCst);
    tokio::time::advance(Duration::from_millis(100)).await;
    a.tick().await;
    assert!(a.is_leader());

    b.tick().await;
    assert!(b.is_leader());
    assert_eq!(b_calls.started(), 1);

    // A reconnects and tries to renew on top of B's record
    a_store.cut.store(false, Ordering::SeqCst);
    a.tick().await;

    assert!(!a.is_leader());
    assert_eq!(a_calls.stopped(), 1);
    assert_eq!(a.leader().as_deref(), Some("node-b"));
    let record = store.peek("election").unwrap();
    assert_eq!(record.holder, "node-b");
    assert_eq!(record.term, 2);
}

#[tokio::test(start_paused = true)]
async fn test_followers_notified_once_per_leader() {
    let store = MemoryLeaseStore::new();
    let clock = Arc::new(MockClock::new());
    let (a, _) = participant("node-a", Arc::new(store.clone()), clock.clone());
    let (b, _) = participant("node-b", Arc::new(store.clone()), clock.clone());
    let (c, c_calls) = participant("node-c", Arc::new(store.clone()), clock.clone());

    a.tick().await;
    c.tick().await;
    c.tick().await;
    assert_eq!(c_calls.new_leader(), 1);

    clock.advance(LEASE + RETRY);
    b.tick().await;
    assert!(b.is_leader());

    c.tick().await;
    c.tick().await;
    assert_eq!(c_calls.new_leader(), 2);
    assert_eq!(c.leader().as_deref(), Some("node-b"));
    assert_eq!(c_calls.started(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_callback() {
    #[derive(Debug, Default)]
    struct StopOnLead {
        elector: std::sync::OnceLock<Arc<LeaderElector>>,
    }

    impl LeaderCallbacks for StopOnLead {
        fn on_started_leading(&self, _lease: &LeaseRecord) {
            if let Some(elector) = self.elector.get() {
                elector.stop();
            }
        }
    }

    let store = MemoryLeaseStore::new();
    let callbacks = Arc::new(StopOnLead::default());
    let elector = Arc::new(
        LeaderElector::new(config("node-a"), Arc::new(store.clone()), callbacks.clone())
            .unwrap()
            .with_clock(Arc::new(MockClock::new())),
    );
    callbacks.elector.set(elector.clone()).unwrap();

    tokio::time::timeout(Duration::from_secs(1), elector.run())
        .await
        .expect("run should return after stop")
        .unwrap();

    assert_eq!(elector.role(), Role::Stopped);
    assert!(store.peek("election").unwrap().is_released());
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_shorter_than_lease() {
    let store = MemoryLeaseStore::new();
    let clock = Arc::new(MockClock::new());
    let (a, a_calls) = participant("node-a", Arc::new(store.clone()), clock.clone());
    let a_task = spawn_run(&a);

    sleep(RETRY).await;
    assert!(a.is_leader());

    store.set_available(false);
    sleep(LEASE / 2).await;
    assert!(a.is_leader());
    store.set_available(true);

    sleep(LEASE).await;
    assert!(a.is_leader());
    assert_eq!(a_calls.stopped(), 0);

    store.set_available(false);
    sleep(LEASE + RETRY * 2).await;
    assert!(!a.is_leader());
    assert_eq!(a_calls.stopped(), 1);

    a.stop();
    a_task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_terms_never_go_back_across_restarts() {
    let store = MemoryLeaseStore::new();
    let clock = Arc::new(MockClock::new());

    let mut last_term = 0;
    for generation in 0..4 {
        // Each generation is a brand new process with no cached record
        let identity = format!("node-gen{generation}");
        let (elector, calls) = participant(&identity, Arc::new(store.clone()), clock.clone());
        let task = spawn_run(&elector);
        sleep(RETRY).await;
        assert!(elector.is_leader());

        let term = store.peek("election").unwrap().term;
        assert!(term > last_term, "term {term} after {last_term}");
        last_term = term;

        elector.stop();
        task.await.unwrap().unwrap();
        assert_eq!(calls.stopped(), 1);
        assert!(store.peek("election").unwrap().is_released());
    }
    assert_eq!(last_term, 4);
}
