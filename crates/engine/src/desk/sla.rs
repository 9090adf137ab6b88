//! Assignment, SLA deadlines, abandonment and the periodic sweep

use chrono::{DateTime, Utc};
use serde::Serialize;

use leadflow_core::{
    ActivityKind, Advisor, AdvisorId, Alert, Assignment, AssignmentOrigin, AssignmentStatus,
    Error, Lead, LeadId, LeadStatus, NewLead, Result, ScoreReason, ScoreSubject,
};

use super::LeadDesk;
use crate::events::EngineEvent;
use crate::qualification::LeadQualified;
use crate::replies;
use crate::timers::TimerKind;

/// What one sweep pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub breaches: usize,
    pub abandonments: usize,
    /// Leads left without an advisor that now have one
    pub assigned: usize,
    pub conversations_expired: usize,
    /// Lock, dedup and timer entries dropped
    pub pruned: usize,
}

impl SweepReport {
    /// True when the pass changed no lead, assignment or conversation
    pub fn is_empty(&self) -> bool {
        self.breaches == 0
            && self.abandonments == 0
            && self.assigned == 0
            && self.conversations_expired == 0
    }
}

impl LeadDesk {
    /// Turn a finished qualification into a lead and hand it to an advisor.
    ///
    /// The conversation is cleared only once the lead is stored, so a failed
    /// write leaves the answers in place for the redelivered message. A
    /// redelivery that finds the lead already stored resumes from wherever
    /// the earlier attempt stopped.
    pub(super) async fn qualify(&self, qualified: LeadQualified, now: DateTime<Utc>) -> Result<Lead> {
        let answers = qualified.answers.len();
        let phone = qualified.phone.clone();

        let (mut lead, created) = match self.leads.find_by_phone(&phone).await? {
            Some(stored) => (stored, false),
            None => {
                let lead = self
                    .leads
                    .create(NewLead {
                        phone: phone.clone(),
                        name: qualified.name,
                        source: self.lead_source.clone(),
                        answers: qualified.answers,
                        created_at: now,
                    })
                    .await?;
                (lead, true)
            },
        };
        self.qualification.complete(&phone).await?;

        let _lead_guard = self.lead_locks.lock(&lead.id).await;

        if created {
            tracing::info!(lead_id = lead.id, phone = %phone, answers, "Lead qualified");
            self.publish(EngineEvent::LeadQualified {
                lead_id: lead.id,
                phone,
                answers,
            });
        } else {
            tracing::warn!(lead_id = lead.id, status = %lead.status, "Resuming qualification handoff for stored lead");
        }

        if lead.status == LeadStatus::Nuevo {
            self.transition(&mut lead, LeadStatus::Precalificado, None, now)
                .await?;
        }
        if lead.status == LeadStatus::Precalificado
            && self.scheduler.active_for_lead(lead.id).await?.is_none()
        {
            self.assign(&mut lead, AssignmentOrigin::Qualification, &[], now)
                .await?;
        }
        self.arm_abandonment(&lead);
        Ok(lead)
    }

    /// Pick an advisor and open an assignment.
    ///
    /// Caller holds the lead lock. Returns `None`, after alerting, when no
    /// eligible advisor is available; the sweep retries later.
    pub(super) async fn assign(
        &self,
        lead: &mut Lead,
        origin: AssignmentOrigin,
        exclude: &[AdvisorId],
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>> {
        let Some(advisor) = self.scheduler.select_advisor(&self.scoring, exclude).await? else {
            tracing::warn!(lead_id = lead.id, origin = ?origin, "No advisor available");
            self.alerter.alert(Alert::warning(
                "scheduler",
                format!("No available advisor for lead {}", lead.id),
            ));
            return Ok(None);
        };

        let assignment = self.open_assignment(lead, &advisor, now, origin).await?;
        if lead.status == LeadStatus::Precalificado {
            self.transition(lead, LeadStatus::Asignado, None, now).await?;
        }
        Ok(Some(assignment))
    }

    /// Store the assignment, start its SLA clock and notify the advisor
    pub(super) async fn open_assignment(
        &self,
        lead: &Lead,
        advisor: &Advisor,
        now: DateTime<Utc>,
        origin: AssignmentOrigin,
    ) -> Result<Assignment> {
        let assignment = self.scheduler.open(lead.id, advisor.id, now, origin).await?;
        self.arm_sla(&assignment, now);
        self.reply(&advisor.phone, &replies::assignment_notice(lead, &assignment))
            .await;

        self.publish(EngineEvent::AssignmentCreated {
            lead_id: lead.id,
            assignment_id: assignment.id,
            advisor_id: advisor.id,
            origin,
        });
        Ok(assignment)
    }

    fn arm_sla(&self, assignment: &Assignment, now: DateTime<Utc>) {
        let delay = assignment.sla_deadline - now;
        if let Err(err) = self.timers.arm_sla(assignment.lead_id, assignment.id, delay) {
            self.scheduling_fault(err);
        }
    }

    /// (Re)arm the abandonment check at the lead's current horizon
    pub(super) fn arm_abandonment(&self, lead: &Lead) {
        let horizon = lead.abandonment_reference() + self.sla.abandonment();
        let delay = horizon - self.clock.now();
        if let Err(err) = self.timers.arm_abandonment(lead.id, delay) {
            self.scheduling_fault(err);
        }
    }

    /// Cancel every timer of a lead that reached a terminal status
    pub(super) async fn release_timers(&self, lead_id: LeadId) -> Result<()> {
        self.timers.cancel_abandonment(lead_id);
        if let Some(active) = self.scheduler.active_for_lead(lead_id).await? {
            self.timers.cancel_sla(active.id);
        }
        Ok(())
    }

    pub(super) async fn dispatch_timer(&self, kind: TimerKind) {
        let result = match kind {
            TimerKind::SlaDeadline {
                lead_id,
                assignment_id,
            } => self.handle_sla_deadline(lead_id, assignment_id).await,
            TimerKind::Abandonment { lead_id } => self.handle_abandonment(lead_id).await,
        };

        if let Err(err) = result {
            tracing::error!(?kind, error = %err, category = err.category(), "Timer handling failed");
        }
    }

    /// SLA deadline fired for an assignment.
    ///
    /// Re-reads the assignment under the lead lock; anything but a still
    /// pending, overdue assignment on an open lead is a no-op. Returns whether
    /// a breach was applied.
    pub async fn handle_sla_deadline(&self, lead_id: LeadId, assignment_id: uuid::Uuid) -> Result<bool> {
        let _lead_guard = self.lead_locks.lock(&lead_id).await;

        let Some(assignment) = self.scheduler.get(assignment_id).await? else {
            return Ok(false);
        };
        if assignment.status != AssignmentStatus::Pending {
            tracing::debug!(lead_id, %assignment_id, status = assignment.status.as_str(), "Deadline for settled assignment ignored");
            return Ok(false);
        }
        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(false);
        };
        if lead.status.is_terminal() {
            return Ok(false);
        }

        let now = self.clock.now();
        if !assignment.is_overdue(now) {
            self.arm_sla(&assignment, now);
            return Ok(false);
        }

        self.settle_deadline(&mut lead, assignment, now).await
    }

    /// Settle a pending assignment whose deadline passed.
    ///
    /// Caller holds the lead lock. A lead with recorded contact closes the
    /// assignment as answered; otherwise it is a breach. Returns whether a
    /// breach was applied.
    pub(super) async fn settle_deadline(
        &self,
        lead: &mut Lead,
        assignment: Assignment,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !contact_recorded(lead, &assignment) {
            self.breach(lead, assignment, now).await?;
            return Ok(true);
        }

        let assignment = self
            .scheduler
            .close(assignment, AssignmentStatus::Responded, now)
            .await?;
        self.timers.cancel_sla(assignment.id);
        tracing::info!(
            lead_id = lead.id,
            advisor_id = assignment.advisor_id,
            status = %lead.status,
            "Deadline reached on a lead already in contact, no breach"
        );
        Ok(false)
    }

    /// Apply an SLA breach and move the lead to another advisor.
    ///
    /// Caller holds the lead lock. The lead keeps its status.
    pub(super) async fn breach(
        &self,
        lead: &mut Lead,
        assignment: Assignment,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let assignment = self
            .scheduler
            .close(assignment, AssignmentStatus::Breached, now)
            .await?;
        self.timers.cancel_sla(assignment.id);

        tracing::warn!(
            lead_id = lead.id,
            advisor_id = assignment.advisor_id,
            assignment_id = %assignment.id,
            deadline = %assignment.sla_deadline,
            "SLA breached"
        );
        self.publish(EngineEvent::SlaBreached {
            lead_id: lead.id,
            assignment_id: assignment.id,
            advisor_id: assignment.advisor_id,
        });

        let subject = ScoreSubject::Assignment(assignment.id);
        self.scoring
            .award(assignment.advisor_id, ScoreReason::SlaBreach, subject)
            .await?;
        self.scoring
            .award(assignment.advisor_id, ScoreReason::ForcedReassignment, subject)
            .await?;

        let next = self
            .assign(
                lead,
                AssignmentOrigin::ForcedReassignment,
                &[assignment.advisor_id],
                now,
            )
            .await?;
        if let Some(next) = next {
            self.log_activity(
                lead.id,
                ActivityKind::Reassigned {
                    from_advisor: Some(assignment.advisor_id),
                    to_advisor: next.advisor_id,
                },
                None,
                now,
            )
            .await?;
        }
        Ok(())
    }

    /// Abandonment horizon fired for a lead. Returns whether it was abandoned.
    pub async fn handle_abandonment(&self, lead_id: LeadId) -> Result<bool> {
        let _lead_guard = self.lead_locks.lock(&lead_id).await;

        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(false);
        };
        if lead.status.is_terminal() {
            return Ok(false);
        }

        let now = self.clock.now();
        if now < lead.abandonment_reference() + self.sla.abandonment() {
            self.arm_abandonment(&lead);
            return Ok(false);
        }

        let active = self.scheduler.active_for_lead(lead_id).await?;
        self.log_activity(lead_id, ActivityKind::Abandoned, None, now)
            .await?;
        self.transition(&mut lead, LeadStatus::Perdido, None, now)
            .await?;
        if let Some(active) = &active {
            self.scoring
                .award(
                    active.advisor_id,
                    ScoreReason::Abandonment,
                    ScoreSubject::Lead(lead_id),
                )
                .await?;
        }
        self.release_timers(lead_id).await?;

        tracing::warn!(
            lead_id,
            advisor_id = active.as_ref().map(|a| a.advisor_id),
            since = %lead.abandonment_reference(),
            "Lead abandoned"
        );
        self.publish(EngineEvent::LeadAbandoned { lead_id });
        Ok(true)
    }

    /// Retry assignment for a lead left without an advisor
    async fn retry_assignment(&self, lead_id: LeadId) -> Result<bool> {
        let _lead_guard = self.lead_locks.lock(&lead_id).await;

        let Some(mut lead) = self.leads.get(lead_id).await? else {
            return Ok(false);
        };
        if !matches!(lead.status, LeadStatus::Precalificado | LeadStatus::Asignado) {
            return Ok(false);
        }
        if self.scheduler.active_for_lead(lead_id).await?.is_some() {
            return Ok(false);
        }

        let now = self.clock.now();
        let assigned = self
            .assign(&mut lead, AssignmentOrigin::Sweep, &[], now)
            .await?;
        Ok(assigned.is_some())
    }

    /// Recompute every deadline from stored state.
    ///
    /// Catches anything a lost or never-armed timer missed, retries leads
    /// without an advisor and expires stale conversations. Failures on one
    /// item are logged and do not stop the pass.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for assignment in self.scheduler.overdue(now).await? {
            match self
                .handle_sla_deadline(assignment.lead_id, assignment.id)
                .await
            {
                Ok(true) => report.breaches += 1,
                Ok(false) => {},
                Err(err) => log_sweep_error("sla_deadline", assignment.lead_id, &err),
            }
        }

        let horizon = self.sla.abandonment();
        for lead in self.leads.list_open().await? {
            if now < lead.abandonment_reference() + horizon {
                continue;
            }
            match self.handle_abandonment(lead.id).await {
                Ok(true) => report.abandonments += 1,
                Ok(false) => {},
                Err(err) => log_sweep_error("abandonment", lead.id, &err),
            }
        }

        for lead in self.leads.list_open().await? {
            if !matches!(lead.status, LeadStatus::Precalificado | LeadStatus::Asignado) {
                continue;
            }
            match self.retry_assignment(lead.id).await {
                Ok(true) => report.assigned += 1,
                Ok(false) => {},
                Err(err) => log_sweep_error("assignment", lead.id, &err),
            }
        }

        for phone in self.qualification.purge_expired(now).await? {
            tracing::info!(phone = %phone, "Qualification conversation abandoned");
            self.publish(EngineEvent::ConversationAbandoned { phone });
            report.conversations_expired += 1;
        }

        report.pruned = self.phone_locks.prune()
            + self.lead_locks.prune()
            + self.recent.prune(now)
            + self.timers.prune_finished();

        Ok(report)
    }
}

/// Contact already recorded on the lead: a contacted status, or an advisor
/// action after the assignment opened
fn contact_recorded(lead: &Lead, assignment: &Assignment) -> bool {
    matches!(
        lead.status,
        LeadStatus::Contactado | LeadStatus::Cita | LeadStatus::Seguimiento
    ) || lead
        .last_advisor_action_at
        .is_some_and(|at| at > assignment.assigned_at)
}

fn log_sweep_error(stage: &'static str, lead_id: LeadId, err: &Error) {
    tracing::error!(stage, lead_id, error = %err, "Sweep item failed");
}
