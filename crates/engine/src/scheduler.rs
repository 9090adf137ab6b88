//! Advisor selection and assignment bookkeeping

use chrono::{DateTime, Duration, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use leadflow_core::{
    Advisor, AdvisorDirectory, AdvisorId, Assignment, AssignmentOrigin, AssignmentRepository,
    AssignmentStatus, LeadId, Result,
};

use crate::scoring::ScoringEngine;

pub struct AssignmentScheduler {
    assignments: Arc<dyn AssignmentRepository>,
    advisors: Arc<dyn AdvisorDirectory>,
    response_window: Duration,
}

impl AssignmentScheduler {
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        advisors: Arc<dyn AdvisorDirectory>,
        response_window: Duration,
    ) -> Self {
        Self {
            assignments,
            advisors,
            response_window,
        }
    }

    pub fn response_window(&self) -> Duration {
        self.response_window
    }

    /// Highest-scoring available advisor not in `exclude`
    pub async fn select_advisor(
        &self,
        scoring: &ScoringEngine,
        exclude: &[AdvisorId],
    ) -> Result<Option<Advisor>> {
        let candidates: Vec<Advisor> = self
            .advisors
            .list_available()
            .await?
            .into_iter()
            .filter(|a| !exclude.contains(&a.id))
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        let scores = scoring.scores().await?;
        Ok(pick_advisor(candidates, &scores))
    }

    pub async fn advisor(&self, id: AdvisorId) -> Result<Option<Advisor>> {
        Ok(self.advisors.get(id).await?)
    }

    pub async fn active_for_lead(&self, lead_id: LeadId) -> Result<Option<Assignment>> {
        Ok(self.assignments.active_for_lead(lead_id).await?)
    }

    pub async fn history(&self, lead_id: LeadId) -> Result<Vec<Assignment>> {
        Ok(self.assignments.list_for_lead(lead_id).await?)
    }

    /// Store a fresh pending assignment with its SLA deadline
    pub async fn open(
        &self,
        lead_id: LeadId,
        advisor_id: AdvisorId,
        now: DateTime<Utc>,
        origin: AssignmentOrigin,
    ) -> Result<Assignment> {
        let assignment = Assignment::new(lead_id, advisor_id, now, self.response_window, origin);
        self.assignments.insert(&assignment).await?;

        tracing::info!(
            lead_id,
            advisor_id,
            assignment_id = %assignment.id,
            deadline = %assignment.sla_deadline,
            origin = ?origin,
            "Assignment created"
        );
        Ok(assignment)
    }

    /// Move an assignment out of `Pending`/active
    pub async fn close(
        &self,
        mut assignment: Assignment,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> Result<Assignment> {
        if status == AssignmentStatus::Responded && assignment.responded_at.is_none() {
            assignment.responded_at = Some(at);
        }
        assignment.status = status;
        self.assignments.update(&assignment).await?;

        tracing::debug!(
            lead_id = assignment.lead_id,
            assignment_id = %assignment.id,
            status = status.as_str(),
            "Assignment updated"
        );
        Ok(assignment)
    }

    pub async fn get(&self, id: uuid::Uuid) -> Result<Option<Assignment>> {
        Ok(self.assignments.get(id).await?)
    }

    /// Pending assignments whose deadline has passed
    pub async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .list_pending()
            .await?
            .into_iter()
            .filter(|a| a.is_overdue(now))
            .collect())
    }
}

/// Highest score wins; ties go to the lowest advisor id
pub fn pick_advisor(candidates: Vec<Advisor>, scores: &HashMap<AdvisorId, i64>) -> Option<Advisor> {
    candidates
        .into_iter()
        .max_by_key(|a| (scores.get(&a.id).copied().unwrap_or(0), Reverse(a.id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisor(id: AdvisorId) -> Advisor {
        Advisor {
            id,
            name: format!("Asesor {}", id),
            phone: format!("52155000000{:02}", id),
            available: true,
        }
    }

    #[test]
    fn test_highest_score_wins() {
        let scores = HashMap::from([(1, 10), (2, 40), (3, -5)]);
        let picked = pick_advisor(vec![advisor(1), advisor(2), advisor(3)], &scores).unwrap();
        assert_eq!(picked.id, 2);
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let scores = HashMap::from([(4, 10), (2, 10)]);
        let picked = pick_advisor(vec![advisor(4), advisor(2), advisor(7)], &scores).unwrap();
        assert_eq!(picked.id, 2);

        let picked = pick_advisor(vec![advisor(9), advisor(5)], &HashMap::new()).unwrap();
        assert_eq!(picked.id, 5);
    }

    #[test]
    fn test_no_candidates() {
        assert!(pick_advisor(Vec::new(), &HashMap::new()).is_none());
    }
}
