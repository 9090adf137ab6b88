//! Assignment storage

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use leadflow_core::{Assignment, AssignmentRepository, AssignmentStatus, LeadId, StoreError};

/// Assignments keyed by id; enforces at most one active assignment per lead
#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    assignments: RwLock<HashMap<Uuid, Assignment>>,
}

impl InMemoryAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_conflict(
        map: &HashMap<Uuid, Assignment>,
        candidate: &Assignment,
    ) -> Option<StoreError> {
        if !candidate.is_active() {
            return None;
        }
        map.values()
            .find(|a| a.lead_id == candidate.lead_id && a.id != candidate.id && a.is_active())
            .map(|existing| StoreError::Duplicate {
                entity: "active assignment",
                key: format!("lead {} (assignment {})", candidate.lead_id, existing.id),
            })
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn insert(&self, assignment: &Assignment) -> Result<(), StoreError> {
        let mut map = self.assignments.write();

        if map.contains_key(&assignment.id) {
            return Err(StoreError::Duplicate {
                entity: "assignment",
                key: assignment.id.to_string(),
            });
        }
        if let Some(err) = Self::active_conflict(&map, assignment) {
            return Err(err);
        }

        map.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        Ok(self.assignments.read().get(&id).cloned())
    }

    async fn update(&self, assignment: &Assignment) -> Result<(), StoreError> {
        let mut map = self.assignments.write();

        if !map.contains_key(&assignment.id) {
            return Err(StoreError::NotFound {
                entity: "assignment",
                key: assignment.id.to_string(),
            });
        }
        if let Some(err) = Self::active_conflict(&map, assignment) {
            return Err(err);
        }

        map.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn active_for_lead(&self, lead_id: LeadId) -> Result<Option<Assignment>, StoreError> {
        Ok(self
            .assignments
            .read()
            .values()
            .find(|a| a.lead_id == lead_id && a.is_active())
            .cloned())
    }

    async fn list_for_lead(&self, lead_id: LeadId) -> Result<Vec<Assignment>, StoreError> {
        let mut list: Vec<Assignment> = self
            .assignments
            .read()
            .values()
            .filter(|a| a.lead_id == lead_id)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.assigned_at);
        Ok(list)
    }

    async fn list_pending(&self) -> Result<Vec<Assignment>, StoreError> {
        let mut list: Vec<Assignment> = self
            .assignments
            .read()
            .values()
            .filter(|a| a.status == AssignmentStatus::Pending)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.sla_deadline);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use leadflow_core::AssignmentOrigin;

    fn assignment(lead_id: LeadId, advisor_id: u64) -> Assignment {
        Assignment::new(
            lead_id,
            advisor_id,
            Utc::now(),
            Duration::minutes(10),
            AssignmentOrigin::Qualification,
        )
    }

    #[tokio::test]
    async fn test_single_active_assignment_per_lead() {
        let repo = InMemoryAssignmentRepository::new();
        repo.insert(&assignment(1, 10)).await.unwrap();

        let err = repo.insert(&assignment(1, 11)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));

        repo.insert(&assignment(2, 11)).await.unwrap();
        assert_eq!(repo.list_pending().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_superseded_assignment_frees_lead() {
        let repo = InMemoryAssignmentRepository::new();
        let mut first = assignment(1, 10);
        repo.insert(&first).await.unwrap();

        first.status = AssignmentStatus::Breached;
        repo.update(&first).await.unwrap();

        let second = assignment(1, 11);
        repo.insert(&second).await.unwrap();

        let active = repo.active_for_lead(1).await.unwrap().unwrap();
        assert_eq!(active.advisor_id, 11);
        assert_eq!(repo.list_for_lead(1).await.unwrap().len(), 2);
        assert_eq!(repo.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_assignment() {
        let repo = InMemoryAssignmentRepository::new();
        let err = repo.update(&assignment(1, 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
