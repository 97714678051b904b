//! Per-instance serialization
//!
//! One async mutex per [`EntityKey`]. The engine holds an instance's lock
//! for a whole evaluation; processors that mutate *other* instances take the
//! same locks through their context. Entries are created on demand and pruned
//! once nothing holds or waits for them.

use crate::entity::EntityKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<EntityKey, Arc<tokio::sync::Mutex<()>>>;

/// Shared table of instance locks; clones share the same table
#[derive(Debug, Clone, Default)]
pub struct InstanceLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Drop entries only the table itself still references
fn prune(locks: &mut LockMap) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and hold it until the guard drops
    ///
    /// Locking the instance a processor is already running for deadlocks.
    pub async fn acquire(&self, key: &EntityKey) -> InstanceGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Waiters cancelled after being handed the lock leave entries behind.
            prune(&mut locks);
            locks.entry(key.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;

        InstanceGuard {
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of instances currently held or waited on
    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held instance lock
pub struct InstanceGuard {
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut locks);
    }
}

impl std::fmt::Debug for InstanceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceGuard").finish_non_exhaustive()
    }
}
