//! Append-only score ledger

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use leadflow_core::{AdvisorId, ScoreEvent, ScoreLedger, StoreError};

#[derive(Default)]
struct Inner {
    keys: HashSet<String>,
    events: Vec<ScoreEvent>,
}

/// Ledger that rejects a second event for the same `(subject, reason)`
#[derive(Default)]
pub struct InMemoryScoreLedger {
    inner: Mutex<Inner>,
}

impl InMemoryScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ScoreLedger for InMemoryScoreLedger {
    async fn append(&self, event: ScoreEvent) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.keys.insert(event.idempotency_key()) {
            return Ok(false);
        }
        inner.events.push(event);
        Ok(true)
    }

    async fn events_for(&self, advisor_id: AdvisorId) -> Result<Vec<ScoreEvent>, StoreError> {
        Ok(self
            .inner
            .lock()
            .events
            .iter()
            .filter(|e| e.advisor_id == advisor_id)
            .cloned()
            .collect())
    }

    async fn all_events(&self) -> Result<Vec<ScoreEvent>, StoreError> {
        Ok(self.inner.lock().events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadflow_core::{ScoreReason, ScoreSubject};
    use uuid::Uuid;

    fn event(advisor_id: AdvisorId, reason: ScoreReason, subject: ScoreSubject) -> ScoreEvent {
        ScoreEvent {
            id: Uuid::new_v4(),
            advisor_id,
            delta: 2,
            reason,
            subject,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_ignored() {
        let ledger = InMemoryScoreLedger::new();
        let subject = ScoreSubject::Lead(7);

        assert!(ledger
            .append(event(1, ScoreReason::QualityNote, subject))
            .await
            .unwrap());
        assert!(!ledger
            .append(event(2, ScoreReason::QualityNote, subject))
            .await
            .unwrap());
        assert!(ledger
            .append(event(1, ScoreReason::Close, subject))
            .await
            .unwrap());

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.events_for(1).await.unwrap().len(), 2);
        assert!(ledger.events_for(2).await.unwrap().is_empty());
    }
}
