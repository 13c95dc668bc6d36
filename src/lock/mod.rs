//! Locking primitives
//!
//! Two distinct scopes:
//!
//! - [`FileLocker`] — per-logical-path mutual exclusion *within one
//!   mutation*. A new instance is created for every put/update call; it
//!   keeps parallel adders in the same update closure from racing on a
//!   single logical path. It is not a cross-process lock.
//! - [`ObjectLock`] — per-object reader/writer locks held only across the
//!   final storage install step, so two mutations of the same object
//!   serialize while mutations of different objects never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};

use crate::errors::{OcflError, Result};

/// Per-logical-path lock registry scoped to a single mutation.
///
/// A zero timeout means "try once": acquisition never parks and fails
/// immediately if the path is held.
pub struct FileLocker {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

/// Guard for one logical path; the lock is released on drop
pub struct FileLockGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl FileLocker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the lock for a logical path, blocking up to the configured
    /// timeout.
    pub fn lock(&self, logical_path: &str) -> Result<FileLockGuard> {
        let entry = {
            let mut locks = self.locks.lock();
            locks
                .entry(logical_path.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = if self.timeout.is_zero() {
            entry.try_lock_arc()
        } else {
            entry.try_lock_arc_for(self.timeout)
        };

        guard.map(|guard| FileLockGuard { _guard: guard }).ok_or_else(|| {
            OcflError::LockTimeout(format!(
                "Failed to acquire lock on {} within {:?}",
                logical_path, self.timeout
            ))
        })
    }

    /// Acquire, run, release on all exit paths
    pub fn with_lock<T>(&self, logical_path: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.lock(logical_path)?;
        f()
    }
}

/// Per-object reader/writer lock map.
///
/// Entries are created on demand and live for the repository's lifetime;
/// the map only ever holds one small entry per object that has been
/// written.
#[derive(Default)]
pub struct ObjectLock {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl ObjectLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, object_id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(object_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Run `f` holding the object's writer lock
    pub fn in_write_lock<T>(&self, object_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let entry = self.entry(object_id);
        let _guard = entry.write();
        f()
    }

    /// Run `f` holding the object's reader lock
    pub fn in_read_lock<T>(&self, object_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let entry = self.entry(object_id);
        let _guard = entry.read();
        f()
    }
}
