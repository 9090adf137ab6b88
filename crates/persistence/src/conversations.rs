//! Qualification conversation store
//!
//! Entries carry an expiry instant. Expired entries are invisible to `get`
//! and count as absent for compare-and-set, but stay in memory until
//! `purge_expired` reports them so the caller can observe the timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use leadflow_core::{ConversationState, ConversationStore, StoreError, Versioned};

struct Entry {
    state: ConversationState,
    version: u64,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    // Monotonic across all keys so a recreated entry never reuses a version
    next_version: u64,
    entries: HashMap<String, Entry>,
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: Mutex<Inner>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held, expired or not
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Versioned<ConversationState>>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .get(phone)
            .filter(|e| e.expires_at > now)
            .map(|e| Versioned {
                value: e.state.clone(),
                version: e.version,
            }))
    }

    async fn put(
        &self,
        state: &ConversationState,
        expected_version: Option<u64>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();

        let found = inner
            .entries
            .get(&state.phone)
            .filter(|e| e.expires_at > now)
            .map(|e| e.version);

        if found != expected_version {
            return Err(StoreError::Conflict {
                key: state.phone.clone(),
                expected: expected_version,
                found,
            });
        }

        inner.next_version += 1;
        let version = inner.next_version;
        inner.entries.insert(
            state.phone.clone(),
            Entry {
                state: state.clone(),
                version,
                expires_at,
            },
        );
        Ok(version)
    }

    async fn delete(&self, phone: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().entries.remove(phone).is_some())
    }

    async fn expire(&self, phone: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let expired = inner
            .entries
            .get(phone)
            .is_some_and(|e| e.expires_at <= now);
        if expired {
            inner.entries.remove(phone);
        }
        Ok(expired)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(phone, _)| phone.clone())
            .collect();
        for phone in &expired {
            inner.entries.remove(phone);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use leadflow_core::ConversationScript;

    fn state(phone: &str, started_at: DateTime<Utc>) -> ConversationState {
        ConversationState::new(
            phone,
            ConversationScript {
                questions: vec!["Q1".into(), "Q2".into()],
                completion_message: "Gracias".into(),
            },
            started_at,
        )
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = InMemoryConversationStore::new();
        let now = Utc::now();
        let ttl = now + Duration::hours(24);
        let mut s = state("5215500000001", now);

        let v1 = store.put(&s, None, now, ttl).await.unwrap();
        assert!(store.put(&s, None, now, ttl).await.unwrap_err().is_conflict());

        s.record_answer("Casa");
        let v2 = store.put(&s, Some(v1), now, ttl).await.unwrap();
        assert!(v2 > v1);

        let err = store.put(&s, Some(v1), now, ttl).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                key: "5215500000001".into(),
                expected: Some(v1),
                found: Some(v2),
            }
        );

        let current = store.get("5215500000001", now).await.unwrap().unwrap();
        assert_eq!(current.version, v2);
        assert_eq!(current.value.current_step_index, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_invisible_and_purged() {
        let store = InMemoryConversationStore::new();
        let now = Utc::now();
        let s = state("5215500000001", now);
        store.put(&s, None, now, now + Duration::hours(1)).await.unwrap();

        let later = now + Duration::hours(2);
        assert!(store.get("5215500000001", later).await.unwrap().is_none());

        let purged = store.purge_expired(later).await.unwrap();
        assert_eq!(purged, vec!["5215500000001".to_string()]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entry_can_be_replaced() {
        let store = InMemoryConversationStore::new();
        let now = Utc::now();
        store
            .put(&state("5215500000001", now), None, now, now + Duration::hours(1))
            .await
            .unwrap();

        let later = now + Duration::hours(2);
        let fresh = state("5215500000001", later);
        store
            .put(&fresh, None, later, later + Duration::hours(24))
            .await
            .unwrap();

        let current = store.get("5215500000001", later).await.unwrap().unwrap();
        assert_eq!(current.value.started_at, later);
    }

    #[tokio::test]
    async fn test_expire_leaves_live_entries() {
        let store = InMemoryConversationStore::new();
        let now = Utc::now();
        store
            .put(&state("5215500000001", now), None, now, now + Duration::hours(1))
            .await
            .unwrap();

        assert!(!store.expire("5215500000001", now).await.unwrap());
        assert!(store.expire("5215500000001", now + Duration::hours(1)).await.unwrap());
        assert!(store.is_empty());
        assert!(!store.expire("5215500000002", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryConversationStore::new();
        let now = Utc::now();
        store
            .put(&state("5215500000001", now), None, now, now + Duration::hours(1))
            .await
            .unwrap();
        assert!(store.delete("5215500000001").await.unwrap());
        assert!(!store.delete("5215500000001").await.unwrap());
    }
}
