//! Core types and traits for the lead engine
//!
//! This crate provides the foundational types shared by every other crate:
//! - Domain records (leads, assignments, conversations, score events)
//! - The advisor command vocabulary
//! - Error taxonomy (user input, state conflicts, scheduling faults)
//! - Injected clock for deterministic time
//! - Collaborator traits (stores, outbound sender, advisor directory, alerting)

pub mod assignment;
pub mod clock;
pub mod command;
pub mod conversation;
pub mod error;
pub mod inbound;
pub mod lead;
pub mod scoring;
pub mod traits;

pub use assignment::{Advisor, AdvisorId, Assignment, AssignmentOrigin, AssignmentStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandType};
pub use conversation::{ConversationScript, ConversationState, Versioned};
pub use error::{Error, Result, StoreError, UserInputError};
pub use inbound::InboundEvent;
pub use lead::{
    ActivityKind, Lead, LeadActivity, LeadId, LeadNote, LeadStatus, NewLead, QualificationAnswer,
};
pub use scoring::{ScoreEvent, ScoreReason, ScoreSubject};

pub use traits::{
    AdvisorDirectory, Alert, AlertSeverity, AssignmentRepository, ConversationStore,
    LeadRepository, MessageSender, OpsAlerter, ScoreLedger, TracingAlerter,
};
