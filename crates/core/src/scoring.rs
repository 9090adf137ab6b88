//! Advisor points ledger types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::assignment::AdvisorId;
use crate::lead::LeadId;

/// Why points were awarded or deducted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReason {
    Close,
    Appointment,
    PropertyTour,
    QualityNote,
    FlashResponse,
    NormalResponse,
    SlowRejection,
    /// Recorded for audit only, worth zero
    FastRejection,
    SlaBreach,
    ForcedReassignment,
    /// Recorded for audit only, worth zero
    ManualReassignment,
    Abandonment,
}

impl ScoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Appointment => "appointment",
            Self::PropertyTour => "property_tour",
            Self::QualityNote => "quality_note",
            Self::FlashResponse => "flash_response",
            Self::NormalResponse => "normal_response",
            Self::SlowRejection => "slow_rejection",
            Self::FastRejection => "fast_rejection",
            Self::SlaBreach => "sla_breach",
            Self::ForcedReassignment => "forced_reassignment",
            Self::ManualReassignment => "manual_reassignment",
            Self::Abandonment => "abandonment",
        }
    }

    /// Audit-only reasons never move the score
    pub fn is_audit_only(&self) -> bool {
        matches!(self, Self::FastRejection | Self::ManualReassignment)
    }
}

impl fmt::Display for ScoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity an award is tied to, half of the idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ScoreSubject {
    Assignment(Uuid),
    Lead(LeadId),
    /// A single note or appointment, so repeats on one lead each count
    Record(Uuid),
}

impl fmt::Display for ScoreSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assignment(id) => write!(f, "assignment:{}", id),
            Self::Lead(id) => write!(f, "lead:{}", id),
            Self::Record(id) => write!(f, "record:{}", id),
        }
    }
}

/// One append-only ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub id: Uuid,
    pub advisor_id: AdvisorId,
    pub delta: i64,
    pub reason: ScoreReason,
    pub subject: ScoreSubject,
    pub timestamp: DateTime<Utc>,
}

impl ScoreEvent {
    /// `(subject, reason)` pair that makes replays harmless
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.subject, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_ignores_advisor_and_delta() {
        let subject = ScoreSubject::Lead(9);
        let a = ScoreEvent {
            id: Uuid::new_v4(),
            advisor_id: 1,
            delta: 200,
            reason: ScoreReason::Close,
            subject,
            timestamp: Utc::now(),
        };
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        b.advisor_id = 2;
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_eq!(a.idempotency_key(), "lead:9:close");
    }
}
