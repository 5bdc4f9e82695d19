use super::{LeaseRecord, LeaseStore, StoreResult};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-process lease store.
///
/// Clones share the same slots, so one store can be handed to several
/// electors to simulate peers. Availability and latency can be toggled to
/// exercise the elector's failure handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseStore {
    slots: Arc<DashMap<String, LeaseRecord>>,
    unavailable: Arc<AtomicBool>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `false`, every operation fails with `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    /// Delay applied before every operation.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Current record without going through the fault injection.
    pub fn peek(&self, lock_name: &str) -> Option<LeaseRecord> {
        self.slots.get(lock_name).map(|entry| entry.clone())
    }

    async fn enter(&self) -> StoreResult<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn try_create(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<bool> {
        self.enter().await?;
        match self.slots.entry(lock_name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn read(&self, lock_name: &str) -> StoreResult<Option<LeaseRecord>> {
        self.enter().await?;
        Ok(self.peek(lock_name))
    }

    async fn update(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<()> {
        self.enter().await?;
        self.slots.insert(lock_name.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, lock_name: &str) -> StoreResult<()> {
        self.enter().await?;
        self.slots.remove(lock_name);
        Ok(())
    }

    async fn replace(
        &self,
        lock_name: &str,
        expected: &LeaseRecord,
        record: &LeaseRecord,
    ) -> StoreResult<bool> {
        self.enter().await?;
        match self.slots.entry(lock_name.to_string()) {
            Entry::Occupied(mut slot) if slot.get() == expected => {
                slot.insert(record.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
