//! Per-key mutual exclusion
//!
//! Each phone number and each lead is an independent unit of work. Holders of
//! different keys never contend; there is no global lock.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop entries nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLocks::<u64>::new());
        let counter = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let guard = locks.lock(&1).await;

        let task = {
            let locks = locks.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let _g = locks.lock(&1).await;
                counter.lock().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        counter.lock().push("first");
        drop(guard);
        task.await.unwrap();

        assert_eq!(*counter.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::<String>::new();
        let _a = locks.lock(&"a".to_string()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&"b".to_string())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = KeyedLocks::<u64>::new();
        let held = locks.lock(&1).await;
        drop(locks.lock(&2).await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
