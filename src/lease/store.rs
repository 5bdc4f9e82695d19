use super::LeaseRecord;
use crate::error::StoreError;
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shared medium holding one lease record per lock name.
///
/// Only `try_create` must be exclusive: when several callers race on an
/// empty slot exactly one of them gets `Ok(true)`. Every error is treated
/// by the elector as a failed attempt for the current tick, never as fatal.
/// A record that cannot be decoded must be reported as `Ok(None)`.
#[async_trait]
pub trait LeaseStore: Send + Sync + std::fmt::Debug {
    /// Short backend label used in logs.
    fn kind(&self) -> &'static str;

    /// Creates the record only if the slot is empty.
    async fn try_create(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<bool>;

    async fn read(&self, lock_name: &str) -> StoreResult<Option<LeaseRecord>>;

    /// Unconditional overwrite.
    async fn update(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<()>;

    /// Removes the record. Deleting an empty slot is not an error.
    async fn delete(&self, lock_name: &str) -> StoreResult<()>;

    /// Overwrites the slot only if it still holds `expected`.
    ///
    /// The default reads, compares and then updates, which leaves a window
    /// between the read and the write. Backends able to do a conditional
    /// write should override it.
    async fn replace(
        &self,
        lock_name: &str,
        expected: &LeaseRecord,
        record: &LeaseRecord,
    ) -> StoreResult<bool> {
        match self.read(lock_name).await? {
            Some(current) if current == *expected => {
                self.update(lock_name, record).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
