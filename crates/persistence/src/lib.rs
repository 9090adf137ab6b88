//! In-memory persistence for the lead engine
//!
//! Provides storage for:
//! - Leads, notes and the activity log
//! - Assignments (at most one active per lead)
//! - The append-only score ledger
//! - Qualification conversations (TTL + compare-and-set)
//! - The advisor roster
//! - A simulated outbound message channel that records instead of sending

pub mod advisors;
pub mod assignments;
pub mod conversations;
pub mod leads;
pub mod ledger;
pub mod outbox;

use std::sync::Arc;

pub use advisors::InMemoryAdvisorDirectory;
pub use assignments::InMemoryAssignmentRepository;
pub use conversations::InMemoryConversationStore;
pub use leads::InMemoryLeadRepository;
pub use ledger::InMemoryScoreLedger;
pub use outbox::{OutboundMessage, SimulatedMessageSender};

use leadflow_core::Advisor;

/// Combined persistence layer with every store the engine needs
#[derive(Clone)]
pub struct PersistenceLayer {
    pub leads: Arc<InMemoryLeadRepository>,
    pub assignments: Arc<InMemoryAssignmentRepository>,
    pub ledger: Arc<InMemoryScoreLedger>,
    pub conversations: Arc<InMemoryConversationStore>,
    pub advisors: Arc<InMemoryAdvisorDirectory>,
}

/// Build an empty in-memory layer seeded with the given roster
pub fn init_in_memory(roster: Vec<Advisor>) -> PersistenceLayer {
    tracing::info!(advisors = roster.len(), "Initializing in-memory persistence");

    PersistenceLayer {
        leads: Arc::new(InMemoryLeadRepository::new()),
        assignments: Arc::new(InMemoryAssignmentRepository::new()),
        ledger: Arc::new(InMemoryScoreLedger::new()),
        conversations: Arc::new(InMemoryConversationStore::new()),
        advisors: Arc::new(InMemoryAdvisorDirectory::new(roster)),
    }
}
