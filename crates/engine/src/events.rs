//! Engine notifications
//!
//! Published on a broadcast channel after the state change they describe has
//! been stored. Subscribers that lag simply miss events; nothing in the engine
//! depends on delivery.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadflow_core::{AdvisorId, AssignmentOrigin, LeadId, LeadStatus, ScoreReason};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    LeadQualified {
        lead_id: LeadId,
        phone: String,
        answers: usize,
    },
    StatusChanged {
        lead_id: LeadId,
        from: LeadStatus,
        to: LeadStatus,
    },
    AssignmentCreated {
        lead_id: LeadId,
        assignment_id: Uuid,
        advisor_id: AdvisorId,
        origin: AssignmentOrigin,
    },
    /// First qualifying reply from the holding advisor
    ResponseRecorded {
        lead_id: LeadId,
        advisor_id: AdvisorId,
        gap_secs: i64,
    },
    SlaBreached {
        lead_id: LeadId,
        assignment_id: Uuid,
        advisor_id: AdvisorId,
    },
    LeadAbandoned {
        lead_id: LeadId,
    },
    ConversationAbandoned {
        phone: String,
    },
    PointsAwarded {
        advisor_id: AdvisorId,
        reason: ScoreReason,
        delta: i64,
    },
    CommandRejected {
        reason: String,
    },
}

impl EngineEvent {
    /// Short label for metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::LeadQualified { .. } => "lead_qualified",
            Self::StatusChanged { .. } => "status_changed",
            Self::AssignmentCreated { .. } => "assignment_created",
            Self::ResponseRecorded { .. } => "response_recorded",
            Self::SlaBreached { .. } => "sla_breached",
            Self::LeadAbandoned { .. } => "lead_abandoned",
            Self::ConversationAbandoned { .. } => "conversation_abandoned",
            Self::PointsAwarded { .. } => "points_awarded",
            Self::CommandRejected { .. } => "command_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_is_tagged() {
        let event = EngineEvent::StatusChanged {
            lead_id: 3,
            from: LeadStatus::Asignado,
            to: LeadStatus::Contactado,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "CONTACTADO");

        let back: EngineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.name(), "status_changed");
    }
}
