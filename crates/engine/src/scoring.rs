//! Advisor scoring
//!
//! Points come from the configured [`PointsTable`] at award time. Every award
//! is keyed by `(subject, reason)` so replays and duplicate timer fires never
//! count twice. A score is the fold of an advisor's ledger entries.

use chrono::Duration;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use leadflow_config::PointsTable;
use leadflow_core::{AdvisorId, Clock, Result, ScoreEvent, ScoreLedger, ScoreReason, ScoreSubject};

use crate::events::EngineEvent;

pub struct ScoringEngine {
    ledger: Arc<dyn ScoreLedger>,
    points: RwLock<PointsTable>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<EngineEvent>,
}

impl ScoringEngine {
    pub fn new(
        ledger: Arc<dyn ScoreLedger>,
        points: PointsTable,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            ledger,
            points: RwLock::new(points),
            clock,
            events,
        }
    }

    /// Append an award. Returns `None` when this `(subject, reason)` pair was
    /// already recorded.
    pub async fn award(
        &self,
        advisor_id: AdvisorId,
        reason: ScoreReason,
        subject: ScoreSubject,
    ) -> Result<Option<ScoreEvent>> {
        let delta = self.points.read().points(reason);
        let event = ScoreEvent {
            id: Uuid::new_v4(),
            advisor_id,
            delta,
            reason,
            subject,
            timestamp: self.clock.now(),
        };

        if !self.ledger.append(event.clone()).await? {
            tracing::debug!(
                advisor_id,
                reason = %reason,
                subject = %subject,
                "Duplicate award ignored"
            );
            return Ok(None);
        }

        tracing::info!(
            advisor_id,
            reason = %reason,
            subject = %subject,
            delta,
            "Points awarded"
        );
        let _ = self.events.send(EngineEvent::PointsAwarded {
            advisor_id,
            reason,
            delta,
        });

        Ok(Some(event))
    }

    pub async fn score(&self, advisor_id: AdvisorId) -> Result<i64> {
        Ok(self
            .ledger
            .events_for(advisor_id)
            .await?
            .iter()
            .map(|e| e.delta)
            .sum())
    }

    /// Current score of every advisor that has ledger entries
    pub async fn scores(&self) -> Result<HashMap<AdvisorId, i64>> {
        let mut totals = HashMap::new();
        for event in self.ledger.all_events().await? {
            *totals.entry(event.advisor_id).or_insert(0) += event.delta;
        }
        Ok(totals)
    }

    pub async fn ledger_for(&self, advisor_id: AdvisorId) -> Result<Vec<ScoreEvent>> {
        let mut events = self.ledger.events_for(advisor_id).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    pub fn points_table(&self) -> PointsTable {
        self.points.read().clone()
    }

    /// Swap the points table. Entries already in the ledger keep their values.
    pub fn update_points(&self, table: PointsTable) {
        *self.points.write() = table;
        tracing::info!("Points table reloaded");
    }
}

/// Band for a first response arriving `gap` after assignment
pub fn response_band(gap: Duration, flash: Duration, normal: Duration) -> Option<ScoreReason> {
    if gap < flash {
        Some(ScoreReason::FlashResponse)
    } else if gap <= normal {
        Some(ScoreReason::NormalResponse)
    } else {
        None
    }
}

/// Rejection reason for a `PERDIDO` from the holding advisor
pub fn rejection_reason(gap: Duration, flash: Duration) -> ScoreReason {
    if gap < flash {
        ScoreReason::FastRejection
    } else {
        ScoreReason::SlowRejection
    }
}
