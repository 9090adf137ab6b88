//! Lead intake and routing engine
//!
//! Features:
//! - Scripted WhatsApp qualification for unknown phones
//! - Advisor command parsing and the lead lifecycle state machine
//! - Score-ranked advisor assignment with SLA deadlines
//! - Idempotent points ledger
//! - Abandonment detection and a periodic recovery sweep

pub mod dedup;
pub mod desk;
pub mod events;
pub mod lifecycle;
pub mod locks;
pub mod parser;
pub mod qualification;
pub mod replies;
pub mod scheduler;
pub mod scoring;
pub mod timers;

pub use desk::{AdvisorStanding, EngineDeps, InboundOutcome, LeadDesk, LeadSnapshot, SweepReport};
pub use events::EngineEvent;
pub use parser::parse_command;
pub use qualification::{LeadQualified, QualificationStep};
pub use scoring::ScoringEngine;
