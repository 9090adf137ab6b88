//! Advisor roster

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use leadflow_core::{Advisor, AdvisorDirectory, AdvisorId, StoreError};

/// Roster seeded from configuration, with mutable availability
pub struct InMemoryAdvisorDirectory {
    advisors: RwLock<BTreeMap<AdvisorId, Advisor>>,
}

impl InMemoryAdvisorDirectory {
    pub fn new(roster: Vec<Advisor>) -> Self {
        Self {
            advisors: RwLock::new(roster.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    /// Insert or replace an advisor
    pub fn upsert(&self, advisor: Advisor) {
        self.advisors.write().insert(advisor.id, advisor);
    }

    /// Toggle availability. Returns false when the advisor is unknown.
    pub fn set_available(&self, id: AdvisorId, available: bool) -> bool {
        match self.advisors.write().get_mut(&id) {
            Some(advisor) => {
                advisor.available = available;
                tracing::info!(advisor_id = id, available, "Advisor availability changed");
                true
            },
            None => false,
        }
    }

    pub fn all(&self) -> Vec<Advisor> {
        self.advisors.read().values().cloned().collect()
    }
}

#[async_trait]
impl AdvisorDirectory for InMemoryAdvisorDirectory {
    async fn get(&self, id: AdvisorId) -> Result<Option<Advisor>, StoreError> {
        Ok(self.advisors.read().get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Advisor>, StoreError> {
        Ok(self
            .advisors
            .read()
            .values()
            .find(|a| a.phone == phone)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Advisor>, StoreError> {
        Ok(self.all())
    }

    async fn list_available(&self) -> Result<Vec<Advisor>, StoreError> {
        Ok(self
            .advisors
            .read()
            .values()
            .filter(|a| a.available)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisor(id: AdvisorId, phone: &str) -> Advisor {
        Advisor {
            id,
            name: format!("Asesor {}", id),
            phone: phone.to_string(),
            available: true,
        }
    }

    #[tokio::test]
    async fn test_lookup_and_availability() {
        let dir = InMemoryAdvisorDirectory::new(vec![
            advisor(2, "5215511110002"),
            advisor(1, "5215511110001"),
        ]);

        let found = dir.find_by_phone("5215511110002").await.unwrap().unwrap();
        assert_eq!(found.id, 2);
        assert!(dir.find_by_phone("000").await.unwrap().is_none());

        assert!(dir.set_available(1, false));
        assert!(!dir.set_available(9, false));

        let available = dir.list_available().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, 2);
    }
}
