// Lease store backed by one file per lock in a shared directory.
//
// Every write takes an advisory lock on `.<lock>.guard` and performs its
// check and its write on a blocking thread that owns the lock until the
// write is done, so conditional operations are atomic across handles and
// processes sharing the directory. Records are written to a temporary file
// and renamed over the slot, so readers never see a half-written record and
// need no lock.

use super::{LeaseRecord, LeaseStore, StoreResult};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::DateTime;
use fs2::FileExt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// How often a writer retries while another handle holds the guard
const GUARD_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct FileLeaseStore {
    dir: PathBuf,
}

impl FileLeaseStore {
    /// Uses `dir` as is; it must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates `dir` (with `mkdir -p`) if it does not exist yet.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the slot file for `lock_name`.
    pub fn lock_path(&self, lock_name: &str) -> StoreResult<PathBuf> {
        if lock_name.is_empty()
            || lock_name == "."
            || lock_name == ".."
            || lock_name.contains(['/', '\\'])
        {
            return Err(StoreError::Backend(format!(
                "invalid lock name {lock_name:?}"
            )));
        }
        Ok(self.dir.join(format!("{lock_name}.lock")))
    }

    fn guard_path(&self, lock_name: &str) -> PathBuf {
        self.dir.join(format!(".{lock_name}.guard"))
    }

    /// Waits for the slot's advisory lock. The lock is held as long as the
    /// returned file is open and goes away with the process.
    async fn lock_slot(&self, lock_name: &str) -> StoreResult<std::fs::File> {
        let guard = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.guard_path(lock_name))
            .await?
            .into_std()
            .await;
        let contended = fs2::lock_contended_error().raw_os_error();
        loop {
            match guard.try_lock_exclusive() {
                Ok(()) => return Ok(guard),
                Err(e) if e.raw_os_error() == contended => tokio::time::sleep(GUARD_POLL).await,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs `op` on the slot path under the slot lock. `op` runs to the end
    /// on a blocking thread even if the caller stops waiting, and the lock
    /// is released only after it returns.
    async fn locked<T, F>(&self, lock_name: &str, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> StoreResult<T> + Send + 'static,
    {
        let path = self.lock_path(lock_name)?;
        let guard = self.lock_slot(lock_name).await?;
        tokio::task::spawn_blocking(move || {
            let result = op(&path);
            drop(guard);
            result
        })
        .await
        .map_err(|e| StoreError::Backend(format!("lease file task failed: {e}")))?
    }
}

fn temp_path(slot: &Path) -> PathBuf {
    let name = slot
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    slot.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

/// Writes `record` next to the slot and renames it into place.
fn write_slot(slot: &Path, record: &LeaseRecord) -> StoreResult<()> {
    let bytes = serde_json::to_vec(record)?;
    let temp = temp_path(slot);
    let written = std::fs::File::create(&temp)
        .and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&temp, slot));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

/// Outcome of reading a slot file, shared by the async and blocking paths.
fn slot_contents(slot: &Path, read: std::io::Result<Vec<u8>>) -> StoreResult<Option<LeaseRecord>> {
    match read {
        Ok(bytes) => {
            let record = decode(&bytes);
            if record.is_none() {
                warn!(path = %slot.display(), "Unreadable lease record, treating slot as empty");
            }
            Ok(record)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decodes a slot file: the JSON record, or the older `holder:unix_seconds`
/// text form. Anything else is `None`.
pub fn decode(bytes: &[u8]) -> Option<LeaseRecord> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.starts_with('{') {
        return serde_json::from_str(text).ok();
    }

    let (holder, seconds) = text.rsplit_once(':')?;
    if holder.is_empty() {
        return None;
    }
    let renewed_at = DateTime::from_timestamp(seconds.parse().ok()?, 0)?;
    Some(LeaseRecord {
        holder: holder.to_string(),
        renewed_at,
        acquired_at: renewed_at,
        term: 0,
    })
}

#[async_trait]
impl LeaseStore for FileLeaseStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    /// Succeeds when the slot is missing or unreadable. An unreadable slot
    /// would otherwise block every future election.
    async fn try_create(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<bool> {
        let record = record.clone();
        self.locked(lock_name, move |slot| {
            if slot_contents(slot, std::fs::read(slot))?.is_some() {
                return Ok(false);
            }
            write_slot(slot, &record)?;
            debug!(path = %slot.display(), holder = %record.holder, "Created lease slot");
            Ok(true)
        })
        .await
    }

    async fn read(&self, lock_name: &str) -> StoreResult<Option<LeaseRecord>> {
        let path = self.lock_path(lock_name)?;
        slot_contents(&path, fs::read(&path).await)
    }

    async fn update(&self, lock_name: &str, record: &LeaseRecord) -> StoreResult<()> {
        let record = record.clone();
        self.locked(lock_name, move |slot| write_slot(slot, &record))
            .await
    }

    async fn delete(&self, lock_name: &str) -> StoreResult<()> {
        self.locked(lock_name, |slot| match std::fs::remove_file(slot) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn replace(
        &self,
        lock_name: &str,
        expected: &LeaseRecord,
        record: &LeaseRecord,
    ) -> StoreResult<bool> {
        let (expected, record) = (expected.clone(), record.clone());
        self.locked(lock_name, move |slot| {
            if slot_contents(slot, std::fs::read(slot))?.as_ref() != Some(&expected) {
                return Ok(false);
            }
            write_slot(slot, &record)?;
            Ok(true)
        })
        .await
    }
}
