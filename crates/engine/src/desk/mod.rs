//! Lead desk: the engine facade
//!
//! Owns every component and is the only entry point for inbound messages,
//! timer fires, the periodic sweep and administrative overrides.
//!
//! Lock order is always phone, then lead. Timers and admin operations take
//! only the lead lock.

mod commands;
mod sla;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

use leadflow_config::{AutomationConfig, PointsTable, Settings, SlaConfig};
use leadflow_core::{
    ActivityKind, Advisor, AdvisorDirectory, AdvisorId, Alert, Assignment, AssignmentRepository,
    Clock, Command, ConversationStore, Error, InboundEvent, Lead, LeadActivity, LeadId, LeadNote,
    LeadRepository, LeadStatus, MessageSender, OpsAlerter, Result, ScoreEvent, ScoreLedger,
    UserInputError,
};

use crate::dedup::RecentEvents;
use crate::events::EngineEvent;
use crate::locks::KeyedLocks;
use crate::parser::parse_command;
use crate::qualification::{QualificationEngine, QualificationStep};
use crate::replies;
use crate::scheduler::AssignmentScheduler;
use crate::scoring::ScoringEngine;
use crate::timers::{TimerKind, TimerRegistry};

pub use sla::SweepReport;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External collaborators the engine is wired to
#[derive(Clone)]
pub struct EngineDeps {
    pub leads: Arc<dyn LeadRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub ledger: Arc<dyn ScoreLedger>,
    pub conversations: Arc<dyn ConversationStore>,
    pub advisors: Arc<dyn AdvisorDirectory>,
    pub sender: Arc<dyn MessageSender>,
    pub alerter: Arc<dyn OpsAlerter>,
    pub clock: Arc<dyn Clock>,
}

/// What happened to one inbound message
#[derive(Debug, Clone)]
pub enum InboundOutcome {
    /// Same idempotency key already processed
    Duplicate,
    /// Prospect that already owns a lead, or automation disabled
    Ignored,
    Qualification {
        step: QualificationStep,
        /// Set when this message completed the script
        lead_id: Option<LeadId>,
    },
    Command {
        command: Command,
        lead: Lead,
    },
    /// Advisor input rejected; a help reply was sent
    Rejected(UserInputError),
}

impl InboundOutcome {
    /// Label for metrics
    pub fn route(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
            Self::Qualification { .. } => "qualification",
            Self::Command { .. } => "command",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// Read model for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct LeadSnapshot {
    pub lead: Lead,
    pub active_assignment: Option<Assignment>,
    pub assignments: Vec<Assignment>,
    pub notes: Vec<LeadNote>,
    pub activity: Vec<LeadActivity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisorStanding {
    pub advisor: Advisor,
    pub score: i64,
}

pub struct LeadDesk {
    leads: Arc<dyn LeadRepository>,
    advisors: Arc<dyn AdvisorDirectory>,
    sender: Arc<dyn MessageSender>,
    alerter: Arc<dyn OpsAlerter>,
    clock: Arc<dyn Clock>,
    sla: SlaConfig,
    lead_source: String,
    qualification: QualificationEngine,
    scheduler: AssignmentScheduler,
    scoring: ScoringEngine,
    timers: TimerRegistry,
    timer_rx: Mutex<Option<mpsc::UnboundedReceiver<TimerKind>>>,
    phone_locks: KeyedLocks<String>,
    lead_locks: KeyedLocks<LeadId>,
    recent: RecentEvents,
    events: broadcast::Sender<EngineEvent>,
}

impl LeadDesk {
    pub fn new(deps: EngineDeps, settings: &Settings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (timers, timer_rx) = TimerRegistry::new();

        let qualification = QualificationEngine::new(
            deps.conversations.clone(),
            settings.automation.clone(),
            settings.qualification.clone(),
        );
        let scheduler = AssignmentScheduler::new(
            deps.assignments.clone(),
            deps.advisors.clone(),
            settings.sla.response_window(),
        );
        let scoring = ScoringEngine::new(
            deps.ledger.clone(),
            settings.points.clone(),
            deps.clock.clone(),
            events.clone(),
        );

        Self {
            leads: deps.leads,
            advisors: deps.advisors,
            sender: deps.sender,
            alerter: deps.alerter,
            clock: deps.clock,
            sla: settings.sla.clone(),
            lead_source: settings.qualification.lead_source.clone(),
            recent: RecentEvents::new(settings.qualification.conversation_ttl()),
            qualification,
            scheduler,
            scoring,
            timers,
            timer_rx: Mutex::new(Some(timer_rx)),
            phone_locks: KeyedLocks::new(),
            lead_locks: KeyedLocks::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn automation(&self) -> AutomationConfig {
        self.qualification.automation()
    }

    pub fn update_automation(&self, automation: AutomationConfig) {
        self.qualification.update_automation(automation);
    }

    pub fn points_table(&self) -> PointsTable {
        self.scoring.points_table()
    }

    pub fn update_points(&self, table: PointsTable) {
        self.scoring.update_points(table);
    }

    /// Process one inbound message.
    ///
    /// Duplicate deliveries are absorbed. User input errors are answered to
    /// the sender and reported as [`InboundOutcome::Rejected`], never as `Err`.
    pub async fn handle_inbound(&self, event: InboundEvent) -> Result<InboundOutcome> {
        let key = event.idempotency_key();
        let _phone_guard = self.phone_locks.lock(&event.from_phone).await;

        let now = self.clock.now();
        if self.recent.contains(&key, now) {
            tracing::debug!(phone = %event.from_phone, key = %key, "Duplicate inbound event absorbed");
            return Ok(InboundOutcome::Duplicate);
        }

        let outcome = match self.advisors.find_by_phone(&event.from_phone).await? {
            Some(advisor) => self.handle_advisor_message(&advisor, &event).await?,
            None => self.handle_prospect_message(&event, now).await?,
        };

        self.recent.remember(key, now);
        Ok(outcome)
    }

    async fn handle_prospect_message(
        &self,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> Result<InboundOutcome> {
        let phone = event.from_phone.as_str();

        if self.qualification.expire_stale(phone, now).await? {
            self.publish(EngineEvent::ConversationAbandoned {
                phone: phone.to_string(),
            });
        }

        if !self.qualification.has_conversation(phone, now).await? {
            if let Some(lead) = self.leads.find_by_phone(phone).await? {
                tracing::debug!(
                    phone = %phone,
                    lead_id = lead.id,
                    "Message from prospect with existing lead ignored"
                );
                return Ok(InboundOutcome::Ignored);
            }
        }

        let step = self
            .qualification
            .handle_message(phone, &event.text, event.sender_name.as_deref(), now)
            .await?;

        if step == QualificationStep::Ignored {
            return Ok(InboundOutcome::Ignored);
        }

        // A completed script is answered only once its lead is stored
        let lead_id = match &step {
            QualificationStep::Completed { qualified, .. } => {
                Some(self.qualify(qualified.clone(), now).await?.id)
            },
            _ => None,
        };

        for reply in step.replies() {
            self.reply(phone, reply).await;
        }

        Ok(InboundOutcome::Qualification { step, lead_id })
    }

    async fn handle_advisor_message(
        &self,
        advisor: &Advisor,
        event: &InboundEvent,
    ) -> Result<InboundOutcome> {
        let command = match parse_command(&event.text) {
            Ok(command) => command,
            Err(err) => return Ok(self.reject(advisor, err).await),
        };

        tracing::debug!(
            advisor_id = advisor.id,
            lead_id = command.lead_id,
            command = %command.kind,
            "Advisor command received"
        );

        match self.apply_command(advisor, &command, event.timestamp).await {
            Ok((lead, holder)) => {
                let text = replies::confirmation(command.kind, &lead, holder.as_ref());
                self.reply(&advisor.phone, &text).await;
                Ok(InboundOutcome::Command { command, lead })
            },
            Err(Error::UserInput(err)) => Ok(self.reject(advisor, err).await),
            Err(err) => Err(err),
        }
    }

    async fn reject(&self, advisor: &Advisor, err: UserInputError) -> InboundOutcome {
        tracing::debug!(advisor_id = advisor.id, error = %err, "Advisor input rejected");
        self.publish(EngineEvent::CommandRejected {
            reason: err.label().to_string(),
        });
        self.reply(&advisor.phone, &replies::user_error(&err)).await;
        InboundOutcome::Rejected(err)
    }

    /// Send a message; delivery failures are the sender's to retry
    async fn reply(&self, to: &str, text: &str) {
        if let Err(err) = self.sender.send_message(to, text).await {
            tracing::warn!(to = %to, error = %err, "Outbound message failed");
        }
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn scheduling_fault(&self, err: Error) {
        tracing::error!(error = %err, "Scheduling fault");
        self.alerter.alert(Alert::critical("scheduler", err.to_string()));
    }

    /// Explicit administrative reset of a qualification conversation
    pub async fn reset_conversation(&self, phone: &str) -> Result<bool> {
        let _phone_guard = self.phone_locks.lock(&phone.to_string()).await;
        self.qualification.reset(phone).await
    }

    pub async fn lead_snapshot(&self, lead_id: LeadId) -> Result<Option<LeadSnapshot>> {
        let Some(lead) = self.leads.get(lead_id).await? else {
            return Ok(None);
        };
        let assignments = self.scheduler.history(lead_id).await?;
        let active_assignment = assignments.iter().find(|a| a.is_active()).cloned();

        Ok(Some(LeadSnapshot {
            lead,
            active_assignment,
            assignments,
            notes: self.leads.notes(lead_id).await?,
            activity: self.leads.activity(lead_id).await?,
        }))
    }

    /// Every advisor ordered by score, ties by id
    pub async fn leaderboard(&self) -> Result<Vec<AdvisorStanding>> {
        let scores = self.scoring.scores().await?;
        let mut standings: Vec<AdvisorStanding> = self
            .advisors
            .list()
            .await?
            .into_iter()
            .map(|advisor| AdvisorStanding {
                score: scores.get(&advisor.id).copied().unwrap_or(0),
                advisor,
            })
            .collect();
        standings.sort_by(|a, b| b.score.cmp(&a.score).then(a.advisor.id.cmp(&b.advisor.id)));
        Ok(standings)
    }

    pub async fn advisor_ledger(&self, advisor_id: AdvisorId) -> Result<Vec<ScoreEvent>> {
        self.scoring.ledger_for(advisor_id).await
    }

    /// Start the timer worker and the periodic sweep.
    ///
    /// Returns a shutdown sender; send `true` to stop both tasks.
    pub fn start_background_tasks(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if let Some(mut fired) = self.timer_rx.lock().take() {
            let desk = Arc::clone(self);
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(kind) = fired.recv() => desk.dispatch_timer(kind).await,
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                tracing::info!("Timer worker shutting down");
                                break;
                            }
                        }
                    }
                }
            });
        } else {
            tracing::warn!("Timer worker already started");
        }

        let desk = Arc::clone(self);
        let mut shutdown_rx = shutdown_rx;
        let period = self.sla.sweep_interval();
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match desk.sweep().await {
                            Ok(report) if report.is_empty() => {},
                            Ok(report) => tracing::info!(?report, "Sweep applied changes"),
                            Err(err) => tracing::error!(error = %err, "Sweep failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Move a lead to `to`, persist it and log the change
    async fn transition(
        &self,
        lead: &mut Lead,
        to: LeadStatus,
        advisor_id: Option<AdvisorId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let from = lead.status;
        lead.status = to;
        lead.updated_at = self.clock.now();
        self.leads.update(lead).await?;
        self.log_activity(lead.id, ActivityKind::StatusChanged { from, to }, advisor_id, at)
            .await?;

        tracing::info!(lead_id = lead.id, from = %from, to = %to, "Lead status changed");
        self.publish(EngineEvent::StatusChanged {
            lead_id: lead.id,
            from,
            to,
        });
        Ok(())
    }

    async fn log_activity(
        &self,
        lead_id: LeadId,
        kind: ActivityKind,
        advisor_id: Option<AdvisorId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.leads
            .record_activity(LeadActivity {
                lead_id,
                kind,
                advisor_id,
                at,
            })
            .await?;
        Ok(())
    }
}
