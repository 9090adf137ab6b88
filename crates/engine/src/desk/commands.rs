//! Advisor commands and administrative overrides

use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadflow_core::{
    ActivityKind, Advisor, Alert, Assignment, AssignmentOrigin, AssignmentStatus, Command,
    CommandType, Lead, LeadId, LeadNote, LeadStatus, Result, ScoreEvent, ScoreReason,
    ScoreSubject, UserInputError,
};

use super::LeadDesk;
use crate::events::EngineEvent;
use crate::lifecycle;
use crate::scoring::{rejection_reason, response_band};

impl LeadDesk {
    /// Apply one advisor command under the lead lock.
    ///
    /// `at` is when the advisor sent the message; response bands and SLA
    /// checks are measured against it. Returns the updated lead and the
    /// advisor currently holding it.
    pub async fn apply_command(
        &self,
        advisor: &Advisor,
        command: &Command,
        at: DateTime<Utc>,
    ) -> Result<(Lead, Option<Advisor>)> {
        let _lead_guard = self.lead_locks.lock(&command.lead_id).await;

        let mut lead = self
            .leads
            .get(command.lead_id)
            .await?
            .ok_or(UserInputError::LeadNotFound(command.lead_id))?;

        let target = lifecycle::check_command(command, &lead)?;

        if command.kind.is_read_only() {
            let holder = self.holder(lead.id).await?;
            return Ok((lead, holder));
        }

        let now = self.clock.now();

        // A deadline that passed before this message was sent is settled first
        if let Some(active) = self.scheduler.active_for_lead(lead.id).await? {
            if active.is_overdue(at) {
                self.settle_deadline(&mut lead, active, now).await?;
            }
        }

        let active = self.scheduler.active_for_lead(lead.id).await?;
        let held = active
            .as_ref()
            .filter(|a| a.advisor_id == advisor.id)
            .cloned();
        let beneficiary = active.as_ref().map(|a| a.advisor_id).unwrap_or(advisor.id);

        match command.kind {
            CommandType::Activar => {
                self.reactivate(&mut lead, active, now).await?;
                return self.finish(lead).await;
            },
            CommandType::IntentoContacto => {
                self.log_activity(lead.id, ActivityKind::ContactAttempt, Some(advisor.id), at)
                    .await?;
                tracing::info!(lead_id = lead.id, advisor_id = advisor.id, "Contact attempt logged");
            },
            CommandType::Cita => {
                // Every booked appointment counts; replays never reach here
                self.scoring
                    .award(
                        beneficiary,
                        ScoreReason::Appointment,
                        ScoreSubject::Record(Uuid::new_v4()),
                    )
                    .await?;
            },
            CommandType::Cierre => {
                self.scoring
                    .award(beneficiary, ScoreReason::Close, ScoreSubject::Lead(lead.id))
                    .await?;
            },
            CommandType::Perdido => {
                if let Some(assignment) = &held {
                    let reason = rejection_reason(
                        assignment.response_gap(at),
                        self.sla.flash_response(),
                    );
                    self.scoring
                        .award(advisor.id, reason, ScoreSubject::Assignment(assignment.id))
                        .await?;
                }
            },
            CommandType::Notas => {
                let body = command.value.clone().unwrap_or_default();
                let long_enough =
                    body.trim().chars().count() >= self.scoring.points_table().quality_note_min_chars;
                let note = LeadNote::new(lead.id, Some(advisor.id), body, at);
                let note_id = note.id;
                self.leads.add_note(note).await?;
                if long_enough {
                    self.scoring
                        .award(advisor.id, ScoreReason::QualityNote, ScoreSubject::Record(note_id))
                        .await?;
                }
            },
            CommandType::Contactado | CommandType::Seguimiento | CommandType::Info => {},
        }

        // Any working action from the holder stops its SLA clock
        if command.kind.is_advisor_action() {
            if let Some(assignment) = held {
                let with_band = command.kind == CommandType::Contactado;
                self.record_response(assignment, at, with_band).await?;
            }
        }

        if let Some(to) = target.filter(|to| *to != lead.status) {
            self.transition(&mut lead, to, Some(advisor.id), at).await?;
        }

        if command.kind.is_advisor_action() {
            lead.last_advisor_action_at = Some(at);
            lead.updated_at = now;
            self.leads.update(&lead).await?;
            self.arm_abandonment(&lead);
        }

        self.finish(lead).await
    }

    async fn finish(&self, lead: Lead) -> Result<(Lead, Option<Advisor>)> {
        if lead.status.is_terminal() {
            self.release_timers(lead.id).await?;
        }
        let holder = self.holder(lead.id).await?;
        Ok((lead, holder))
    }

    /// Stop the SLA clock for the holder's assignment.
    ///
    /// `with_band` awards the response-time band; only `CONTACTADO` earns one.
    async fn record_response(
        &self,
        assignment: Assignment,
        at: DateTime<Utc>,
        with_band: bool,
    ) -> Result<()> {
        if assignment.status != AssignmentStatus::Pending {
            return Ok(());
        }

        let gap = assignment.response_gap(at);
        let assignment = self
            .scheduler
            .close(assignment, AssignmentStatus::Responded, at)
            .await?;
        self.timers.cancel_sla(assignment.id);

        tracing::info!(
            lead_id = assignment.lead_id,
            advisor_id = assignment.advisor_id,
            gap_secs = gap.num_seconds(),
            "Advisor response recorded"
        );
        self.publish(EngineEvent::ResponseRecorded {
            lead_id: assignment.lead_id,
            advisor_id: assignment.advisor_id,
            gap_secs: gap.num_seconds(),
        });

        if with_band {
            if let Some(reason) =
                response_band(gap, self.sla.flash_response(), self.sla.normal_response())
            {
                self.scoring
                    .award(
                        assignment.advisor_id,
                        reason,
                        ScoreSubject::Assignment(assignment.id),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// `ACTIVAR`: supersede the current assignment with a fresh one
    async fn reactivate(
        &self,
        lead: &mut Lead,
        current: Option<Assignment>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let current_holder = current.as_ref().map(|a| a.advisor_id);
        let exclude: Vec<_> = current_holder.into_iter().collect();

        let mut chosen = self.scheduler.select_advisor(&self.scoring, &exclude).await?;
        if chosen.is_none() && !exclude.is_empty() {
            chosen = self.scheduler.select_advisor(&self.scoring, &[]).await?;
        }

        let Some(advisor) = chosen else {
            tracing::warn!(lead_id = lead.id, "No advisor available for reactivation");
            self.alerter.alert(Alert::warning(
                "scheduler",
                format!("No available advisor to reactivate lead {}", lead.id),
            ));
            return Ok(());
        };

        if let Some(old) = current {
            let old = self
                .scheduler
                .close(old, AssignmentStatus::Reassigned, now)
                .await?;
            self.timers.cancel_sla(old.id);
            self.scoring
                .award(
                    old.advisor_id,
                    ScoreReason::ManualReassignment,
                    ScoreSubject::Assignment(old.id),
                )
                .await?;
        }

        self.log_activity(
            lead.id,
            ActivityKind::Reassigned {
                from_advisor: current_holder,
                to_advisor: advisor.id,
            },
            None,
            now,
        )
        .await?;

        self.open_assignment(lead, &advisor, now, AssignmentOrigin::ManualActivation)
            .await?;
        if lead.status != LeadStatus::Asignado {
            self.transition(lead, LeadStatus::Asignado, None, now).await?;
        }
        Ok(())
    }

    /// Record a property tour for the advisor holding the lead
    pub async fn record_property_tour(&self, lead_id: LeadId) -> Result<Option<ScoreEvent>> {
        let _lead_guard = self.lead_locks.lock(&lead_id).await;

        if self.leads.get(lead_id).await?.is_none() {
            return Err(UserInputError::LeadNotFound(lead_id).into());
        }

        let Some(active) = self.scheduler.active_for_lead(lead_id).await? else {
            tracing::warn!(lead_id, "Property tour on lead without an advisor ignored");
            return Ok(None);
        };

        self.scoring
            .award(
                active.advisor_id,
                ScoreReason::PropertyTour,
                ScoreSubject::Lead(lead_id),
            )
            .await
    }

    /// Administrative override back to `NUEVO`.
    ///
    /// Supersedes the active assignment and restarts the abandonment horizon.
    /// This is not a lifecycle transition and is logged as an override.
    pub async fn reset_lead(&self, lead_id: LeadId) -> Result<Lead> {
        let _lead_guard = self.lead_locks.lock(&lead_id).await;

        let mut lead = self
            .leads
            .get(lead_id)
            .await?
            .ok_or(UserInputError::LeadNotFound(lead_id))?;
        let now = self.clock.now();
        let from = lead.status;

        if let Some(active) = self.scheduler.active_for_lead(lead_id).await? {
            let active = self
                .scheduler
                .close(active, AssignmentStatus::Reassigned, now)
                .await?;
            self.timers.cancel_sla(active.id);
        }

        lead.status = LeadStatus::Nuevo;
        lead.last_advisor_action_at = Some(now);
        lead.updated_at = now;
        self.leads.update(&lead).await?;
        self.log_activity(lead_id, ActivityKind::AdminReset { from }, None, now)
            .await?;
        self.arm_abandonment(&lead);

        tracing::warn!(lead_id, from = %from, "Administrative override: lead reset to NUEVO");
        self.publish(EngineEvent::StatusChanged {
            lead_id,
            from,
            to: LeadStatus::Nuevo,
        });
        Ok(lead)
    }

    /// Advisor bound to the lead's active assignment
    async fn holder(&self, lead_id: LeadId) -> Result<Option<Advisor>> {
        match self.scheduler.active_for_lead(lead_id).await? {
            Some(active) => self.scheduler.advisor(active.advisor_id).await,
            None => Ok(None),
        }
    }
}
