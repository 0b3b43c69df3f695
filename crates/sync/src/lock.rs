//! Per-version mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<i64, Arc<Mutex<()>>>;

/// One lock per version id, so passes over the same version run one after
/// the other while different versions proceed in parallel.
///
/// A version's entry exists only while some pass holds or waits for it.
/// Cloning shares the same set of locks.
#[derive(Debug, Clone, Default)]
pub struct VersionLocks {
    locks: Arc<StdMutex<LockMap>>,
}

/// Held for the duration of one pass; releases the version on drop.
#[derive(Debug)]
pub struct VersionGuard {
    version_id: i64,
    locks: Arc<StdMutex<LockMap>>,
    guard: OwnedMutexGuard<()>,
}
impl VersionGuard {
    pub fn version_id(&self) -> i64 {
        self.version_id
    }
}
impl Drop for VersionGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = OwnedMutexGuard::mutex(&self.guard);
        // Only the map and this guard still refer to the lock: nobody waits.
        if locks.get(&self.version_id).is_some_and(|entry| Arc::ptr_eq(entry, lock))
            && Arc::strong_count(lock) == 2
        {
            locks.remove(&self.version_id);
        }
    }
}

impl VersionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, version_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(version_id).or_default().clone()
    }

    fn guard(&self, version_id: i64, guard: OwnedMutexGuard<()>) -> VersionGuard {
        VersionGuard { version_id, locks: self.locks.clone(), guard }
    }

    /// Wait until no other pass holds `version_id`.
    pub async fn acquire(&self, version_id: i64) -> VersionGuard {
        let lock = self.lock_for(version_id);
        tracing::trace!(version_id, "waiting for version lock");
        let guard = lock.lock_owned().await;
        self.guard(version_id, guard)
    }

    /// Take the lock for `version_id` only if it is free right now.
    pub async fn try_acquire(&self, version_id: i64) -> Option<VersionGuard> {
        let lock = self.lock_for(version_id);
        let guard = lock.try_lock_owned().ok()?;
        Some(self.guard(version_id, guard))
    }

    /// Versions currently held or waited for.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
