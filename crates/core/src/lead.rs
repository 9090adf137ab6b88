//! Lead records
//!
//! A lead is created only after a prospect finishes the qualification script.
//! Its status is changed exclusively by the lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::assignment::AdvisorId;

/// Numeric lead identifier, as typed by advisors in commands
pub type LeadId = u64;

/// Lead status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    /// Created from a qualification event, not yet persisted as qualified
    Nuevo,
    /// Qualification complete, waiting for an advisor
    Precalificado,
    /// Bound to an advisor, SLA clock running
    Asignado,
    /// Advisor reached the prospect
    Contactado,
    /// Appointment booked
    Cita,
    /// Follow-up in progress
    Seguimiento,
    /// Deal closed (terminal)
    Cierre,
    /// Lead lost (terminal)
    Perdido,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nuevo => "NUEVO",
            Self::Precalificado => "PRECALIFICADO",
            Self::Asignado => "ASIGNADO",
            Self::Contactado => "CONTACTADO",
            Self::Cita => "CITA",
            Self::Seguimiento => "SEGUIMIENTO",
            Self::Cierre => "CIERRE",
            Self::Perdido => "PERDIDO",
        }
    }

    /// Terminal statuses accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cierre | Self::Perdido)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NUEVO" => Ok(Self::Nuevo),
            "PRECALIFICADO" => Ok(Self::Precalificado),
            "ASIGNADO" => Ok(Self::Asignado),
            "CONTACTADO" => Ok(Self::Contactado),
            "CITA" => Ok(Self::Cita),
            "SEGUIMIENTO" => Ok(Self::Seguimiento),
            "CIERRE" => Ok(Self::Cierre),
            "PERDIDO" => Ok(Self::Perdido),
            other => Err(format!("unknown lead status: {}", other)),
        }
    }
}

/// One answered qualification prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationAnswer {
    pub prompt: String,
    pub answer: String,
}

impl QualificationAnswer {
    pub fn new(prompt: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            answer: answer.into(),
        }
    }
}

/// Lead record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub phone: String,
    pub name: String,
    pub source: String,
    pub status: LeadStatus,
    /// Answers collected by the qualification script
    pub answers: Vec<QualificationAnswer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last qualifying advisor action, drives the abandonment horizon
    pub last_advisor_action_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Instant from which the abandonment horizon is measured
    pub fn abandonment_reference(&self) -> DateTime<Utc> {
        self.last_advisor_action_at.unwrap_or(self.created_at)
    }
}

/// Data needed to insert a lead; the repository assigns the id
#[derive(Debug, Clone)]
pub struct NewLead {
    pub phone: String,
    pub name: String,
    pub source: String,
    pub answers: Vec<QualificationAnswer>,
    pub created_at: DateTime<Utc>,
}

/// Free-text note attached by an advisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadNote {
    pub id: Uuid,
    pub lead_id: LeadId,
    pub advisor_id: Option<AdvisorId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl LeadNote {
    pub fn new(
        lead_id: LeadId,
        advisor_id: Option<AdvisorId>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            advisor_id,
            body: body.into(),
            created_at,
        }
    }
}

/// Audit entries in a lead's activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    StatusChanged { from: LeadStatus, to: LeadStatus },
    ContactAttempt,
    Reassigned {
        from_advisor: Option<AdvisorId>,
        to_advisor: AdvisorId,
    },
    Abandoned,
    /// Administrative override back to NUEVO
    AdminReset { from: LeadStatus },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadActivity {
    pub lead_id: LeadId,
    pub kind: ActivityKind,
    pub advisor_id: Option<AdvisorId>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            LeadStatus::Nuevo,
            LeadStatus::Precalificado,
            LeadStatus::Asignado,
            LeadStatus::Contactado,
            LeadStatus::Cita,
            LeadStatus::Seguimiento,
            LeadStatus::Cierre,
            LeadStatus::Perdido,
        ] {
            assert_eq!(status.as_str().parse::<LeadStatus>().unwrap(), status);
        }
        assert!("desconocido".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(LeadStatus::Cierre.is_terminal());
        assert!(LeadStatus::Perdido.is_terminal());
        assert!(!LeadStatus::Seguimiento.is_terminal());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&LeadStatus::Precalificado).unwrap();
        assert_eq!(json, "\"PRECALIFICADO\"");
    }

    #[test]
    fn test_abandonment_reference_prefers_last_action() {
        let created = Utc::now();
        let mut lead = Lead {
            id: 1,
            phone: "+5215550000000".into(),
            name: "Ana".into(),
            source: "whatsapp".into(),
            status: LeadStatus::Asignado,
            answers: vec![],
            created_at: created,
            updated_at: created,
            last_advisor_action_at: None,
        };
        assert_eq!(lead.abandonment_reference(), created);

        let later = created + chrono::Duration::hours(2);
        lead.last_advisor_action_at = Some(later);
        assert_eq!(lead.abandonment_reference(), later);
    }
}
