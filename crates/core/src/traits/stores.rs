//! Persistence collaborator traits
//!
//! The engine owns no storage. Each record family sits behind one of these
//! traits so that the backing engine can be swapped without touching the
//! state machines.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::assignment::{AdvisorId, Assignment};
use crate::conversation::{ConversationState, Versioned};
use crate::error::StoreError;
use crate::lead::{Lead, LeadActivity, LeadId, LeadNote, NewLead};
use crate::scoring::ScoreEvent;

/// Lead CRUD plus notes and activity log
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Insert a lead and assign its id. Fails with `Duplicate` when the phone
    /// already owns a lead.
    async fn create(&self, lead: NewLead) -> Result<Lead, StoreError>;

    async fn get(&self, id: LeadId) -> Result<Option<Lead>, StoreError>;

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, StoreError>;

    async fn update(&self, lead: &Lead) -> Result<(), StoreError>;

    /// Leads whose status is not terminal
    async fn list_open(&self) -> Result<Vec<Lead>, StoreError>;

    async fn add_note(&self, note: LeadNote) -> Result<(), StoreError>;

    async fn notes(&self, id: LeadId) -> Result<Vec<LeadNote>, StoreError>;

    async fn record_activity(&self, activity: LeadActivity) -> Result<(), StoreError>;

    async fn activity(&self, id: LeadId) -> Result<Vec<LeadActivity>, StoreError>;
}

/// Assignment storage
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Insert a new assignment. Fails with `Duplicate` if the lead already has
    /// an active one.
    async fn insert(&self, assignment: &Assignment) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Assignment>, StoreError>;

    async fn update(&self, assignment: &Assignment) -> Result<(), StoreError>;

    async fn active_for_lead(&self, lead_id: LeadId) -> Result<Option<Assignment>, StoreError>;

    async fn list_for_lead(&self, lead_id: LeadId) -> Result<Vec<Assignment>, StoreError>;

    async fn list_pending(&self) -> Result<Vec<Assignment>, StoreError>;
}

/// Append-only points ledger
#[async_trait]
pub trait ScoreLedger: Send + Sync {
    /// Append an event. Returns `false` when an event with the same
    /// idempotency key already exists; nothing is written in that case.
    async fn append(&self, event: ScoreEvent) -> Result<bool, StoreError>;

    async fn events_for(&self, advisor_id: AdvisorId) -> Result<Vec<ScoreEvent>, StoreError>;

    async fn all_events(&self) -> Result<Vec<ScoreEvent>, StoreError>;
}

/// Ephemeral per-phone conversation state with TTL and compare-and-set
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Current state, or `None` when absent or expired at `now`
    async fn get(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Versioned<ConversationState>>, StoreError>;

    /// Write `state` if the stored version equals `expected_version`
    /// (`None` = must not exist or be expired at `now`). Returns the new version.
    async fn put(
        &self,
        state: &ConversationState,
        expected_version: Option<u64>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Remove the state. Returns whether anything was removed.
    async fn delete(&self, phone: &str) -> Result<bool, StoreError>;

    /// Remove the state only if it is expired at `now`. Returns whether it
    /// was removed.
    async fn expire(&self, phone: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Drop entries expired at `now`, returning their phones
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError>;
}
