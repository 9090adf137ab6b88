//! Advisors and assignments

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lead::LeadId;

pub type AdvisorId = u64;

/// Sales advisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisor {
    pub id: AdvisorId,
    pub name: String,
    /// WhatsApp number the advisor sends commands from
    pub phone: String,
    /// Whether the advisor can receive new leads
    pub available: bool,
}

/// Assignment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Waiting for the advisor's first qualifying action
    Pending,
    /// Advisor contacted or attempted contact in time
    Responded,
    /// SLA deadline passed without a qualifying action
    Breached,
    /// Superseded by a manual reassignment or administrative reset
    Reassigned,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
            Self::Breached => "breached",
            Self::Reassigned => "reassigned",
        }
    }

    /// Active assignments still bind the lead to their advisor
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Responded)
    }
}

/// Why an assignment was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOrigin {
    Qualification,
    ManualActivation,
    ForcedReassignment,
    /// Retried by the periodic sweep after no advisor was available
    Sweep,
}

/// Binding of one lead to one advisor for a response window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub lead_id: LeadId,
    pub advisor_id: AdvisorId,
    pub assigned_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub sla_deadline: DateTime<Utc>,
    pub status: AssignmentStatus,
    pub origin: AssignmentOrigin,
}

impl Assignment {
    pub fn new(
        lead_id: LeadId,
        advisor_id: AdvisorId,
        assigned_at: DateTime<Utc>,
        response_window: Duration,
        origin: AssignmentOrigin,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            advisor_id,
            assigned_at,
            responded_at: None,
            sla_deadline: assigned_at + response_window,
            status: AssignmentStatus::Pending,
            origin,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Pending and past its deadline
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AssignmentStatus::Pending && now >= self.sla_deadline
    }

    /// Time between assignment and the given reply
    pub fn response_gap(&self, replied_at: DateTime<Utc>) -> Duration {
        replied_at - self.assigned_at
    }
}
