//! SLA and abandonment timers
//!
//! A timer only enqueues a [`TimerKind`]; the worker re-reads stored state
//! under the lead lock before acting, so a late or duplicate fire is harmless.
//! Timers are an optimisation over the periodic sweep, which recomputes the
//! same deadlines from stored timestamps.

use dashmap::DashMap;
use leadflow_core::{Error, LeadId, Result};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    SlaDeadline { lead_id: LeadId, assignment_id: Uuid },
    Abandonment { lead_id: LeadId },
}

pub struct TimerRegistry {
    sla: DashMap<Uuid, AbortHandle>,
    abandonment: DashMap<LeadId, AbortHandle>,
    fired: mpsc::UnboundedSender<TimerKind>,
}

impl TimerRegistry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKind>) {
        let (fired, rx) = mpsc::unbounded_channel();
        (
            Self {
                sla: DashMap::new(),
                abandonment: DashMap::new(),
                fired,
            },
            rx,
        )
    }

    pub fn arm_sla(&self, lead_id: LeadId, assignment_id: Uuid, delay: chrono::Duration) -> Result<()> {
        let handle = self.spawn(
            TimerKind::SlaDeadline {
                lead_id,
                assignment_id,
            },
            delay,
        )?;
        if let Some(previous) = self.sla.insert(assignment_id, handle) {
            previous.abort();
        }
        Ok(())
    }

    pub fn cancel_sla(&self, assignment_id: Uuid) -> bool {
        match self.sla.remove(&assignment_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            },
            None => false,
        }
    }

    /// Arm or re-arm the abandonment check for a lead
    pub fn arm_abandonment(&self, lead_id: LeadId, delay: chrono::Duration) -> Result<()> {
        let handle = self.spawn(TimerKind::Abandonment { lead_id }, delay)?;
        if let Some(previous) = self.abandonment.insert(lead_id, handle) {
            previous.abort();
        }
        Ok(())
    }

    pub fn cancel_abandonment(&self, lead_id: LeadId) -> bool {
        match self.abandonment.remove(&lead_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            },
            None => false,
        }
    }

    /// Forget timers that already fired
    pub fn prune_finished(&self) -> usize {
        let before = self.sla.len() + self.abandonment.len();
        self.sla.retain(|_, h| !h.is_finished());
        self.abandonment.retain(|_, h| !h.is_finished());
        before - (self.sla.len() + self.abandonment.len())
    }

    /// `(sla, abandonment)` timers currently tracked
    pub fn armed(&self) -> (usize, usize) {
        (self.sla.len(), self.abandonment.len())
    }

    fn spawn(&self, kind: TimerKind, delay: chrono::Duration) -> Result<AbortHandle> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Scheduling(format!("timer runtime unavailable: {}", e)))?;

        let delay = delay.to_std().unwrap_or_default();
        let fired = self.fired.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the engine is shutting down
            let _ = fired.send(kind);
        });

        Ok(task.abort_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (timers, mut rx) = TimerRegistry::new();
        let id = Uuid::new_v4();
        timers.arm_sla(1, id, chrono::Duration::minutes(10)).unwrap();

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            rx.recv().await,
            Some(TimerKind::SlaDeadline {
                lead_id: 1,
                assignment_id: id
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (timers, mut rx) = TimerRegistry::new();
        let id = Uuid::new_v4();
        timers.arm_sla(1, id, chrono::Duration::seconds(5)).unwrap();
        assert!(timers.cancel_sla(id));
        assert!(!timers.cancel_sla(id));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_abandonment_timer() {
        let (timers, mut rx) = TimerRegistry::new();
        timers.arm_abandonment(3, chrono::Duration::seconds(5)).unwrap();
        timers.arm_abandonment(3, chrono::Duration::seconds(50)).unwrap();
        assert_eq!(timers.armed(), (0, 1));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::Abandonment { lead_id: 3 }));
    }

    #[test]
    fn test_no_runtime_is_a_scheduling_fault() {
        let (timers, _rx) = TimerRegistry::new();
        let err = timers
            .arm_abandonment(1, chrono::Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, Error::Scheduling(_)));
    }
}
