//! Collaborator traits
//!
//! Everything the engine needs from the outside world is expressed here.

pub mod collaborators;
pub mod stores;

pub use collaborators::{
    AdvisorDirectory, Alert, AlertSeverity, MessageSender, OpsAlerter, TracingAlerter,
};
pub use stores::{AssignmentRepository, ConversationStore, LeadRepository, ScoreLedger};
