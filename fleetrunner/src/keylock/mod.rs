//! Per-key mutual exclusion.
//!
//! [`KeyLock`] hands out locks scoped to a string key, created lazily on
//! first use and cached for reuse. Operations against the same key are
//! serialized; operations against different keys never block each other.
//! The daemon-set manager uses one key per daemon-set type so that a slow
//! restart of one type cannot stall convergence of another.
//!
//! # Contract
//!
//! - [`KeyLock::lock`] returns an RAII guard; the key's lock is released
//!   when the guard drops.
//! - [`KeyLock::lock_all`] acquires every currently known key's lock, in
//!   sorted key order, and is intended only for full teardown.
//! - There is no failure mode. Deadlock avoidance is the caller's
//!   responsibility: never acquire two different keys' locks nested.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard holding one key's lock. Dropping it releases the key.
pub struct KeyLockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLockGuard {
    /// The key this guard is holding.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// A map of per-key async locks, created on demand.
#[derive(Default)]
pub struct KeyLock {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLock {
    /// Creates an empty lock map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached lock for `key`, creating it if absent.
    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("keylock map poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquires the lock for `key`, waiting if another holder has it.
    ///
    /// Locks for distinct keys are independent: this call only contends
    /// with other holders of the same key.
    pub async fn lock(&self, key: &str) -> KeyLockGuard {
        let lock = self.entry(key);
        KeyLockGuard {
            key: key.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Acquires every currently known key's lock.
    ///
    /// Keys are locked in sorted order so that two concurrent `lock_all`
    /// callers cannot deadlock against each other. Keys created after the
    /// snapshot is taken are not covered; callers use this only for
    /// teardown, where no new keys are being introduced.
    pub async fn lock_all(&self) -> Vec<KeyLockGuard> {
        let mut entries: Vec<(String, Arc<AsyncMutex<()>>)> = {
            let locks = self.locks.lock().expect("keylock map poisoned");
            locks
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut guards = Vec::with_capacity(entries.len());
        for (key, lock) in entries {
            guards.push(KeyLockGuard {
                key,
                _guard: lock.lock_owned().await,
            });
        }
        guards
    }

    /// Number of keys that have been locked at least once.
    pub fn known_keys(&self) -> usize {
        self.locks.lock().expect("keylock map poisoned").len()
    }
}
