//! Error taxonomy
//!
//! - [`UserInputError`] - bad advisor input; always answered with a reply to
//!   the sender, never treated as a fault
//! - [`Error::StateConflict`] - concurrent mutation that survived one retry
//! - [`Error::Scheduling`] - timer infrastructure problems, forwarded to alerting
//! - [`StoreError`] - persistence collaborator failures
//!
//! Replayed inbound events are not errors; the dispatcher absorbs them.

use thiserror::Error;

use crate::command::CommandType;
use crate::lead::{LeadId, LeadStatus};

/// Validation failures caused by what a person typed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserInputError {
    #[error("Message does not match <COMMAND> <id> or <id> <COMMAND>")]
    InvalidFormat,

    #[error("Invalid lead id: {0}")]
    InvalidLeadId(String),

    #[error("Lead {0} not found")]
    LeadNotFound(LeadId),

    #[error("Cannot apply {command} to lead {lead_id} with status {status}")]
    InvalidTransition {
        lead_id: LeadId,
        command: CommandType,
        status: LeadStatus,
    },
}

impl UserInputError {
    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::InvalidLeadId(_) => "invalid_lead_id",
            Self::LeadNotFound(_) => "lead_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Persistence collaborator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Version conflict on {key}: expected {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    UserInput(#[from] UserInputError),

    #[error("State conflict on {key} persisted after retry")]
    StateConflict { key: String },

    #[error("Scheduling fault: {0}")]
    Scheduling(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Outbound send failed: {0}")]
    Send(String),
}

impl Error {
    /// True for errors that must be answered to the sender rather than logged as faults
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::UserInput(_))
    }

    /// Short label used for metrics and structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::UserInput(_) => "user_input",
            Self::StateConflict { .. } => "state_conflict",
            Self::Scheduling(_) => "scheduling",
            Self::Store(_) => "store",
            Self::Send(_) => "send",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
