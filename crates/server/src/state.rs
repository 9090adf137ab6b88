//! Application State
//!
//! Shared state across all handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use std::sync::Arc;

use leadflow_config::{load_settings, Settings};
use leadflow_core::{Clock, MessageSender, OpsAlerter};
use leadflow_engine::{EngineDeps, LeadDesk};
use leadflow_persistence::{init_in_memory, InMemoryAdvisorDirectory};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration wrapped in RwLock for hot-reload support
    pub config: Arc<RwLock<Settings>>,
    pub desk: Arc<LeadDesk>,
    /// Roster kept in sync with the `advisors` config section
    pub advisors: Arc<InMemoryAdvisorDirectory>,
    pub metrics: Option<PrometheusHandle>,
    /// Environment name for config reload
    env: Option<String>,
}

impl AppState {
    /// Wire the engine over fresh in-memory stores
    pub fn in_memory(
        config: Settings,
        sender: Arc<dyn MessageSender>,
        alerter: Arc<dyn OpsAlerter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = init_in_memory(config.roster());
        let deps = EngineDeps {
            leads: store.leads.clone(),
            assignments: store.assignments.clone(),
            ledger: store.ledger.clone(),
            conversations: store.conversations.clone(),
            advisors: store.advisors.clone(),
            sender,
            alerter,
            clock,
        };
        Self::new(config, deps, store.advisors)
    }

    /// Wire the engine over the given collaborators. `advisors` is the roster
    /// that config reloads write to.
    pub fn new(config: Settings, deps: EngineDeps, advisors: Arc<InMemoryAdvisorDirectory>) -> Self {
        let desk = Arc::new(LeadDesk::new(deps, &config));

        Self {
            config: Arc::new(RwLock::new(config)),
            desk,
            advisors,
            metrics: None,
            env: None,
        }
    }

    pub fn with_env(mut self, env: Option<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Reload configuration from files.
    ///
    /// The qualification script, the point table and the advisor roster take
    /// effect immediately. Server, SLA window and WhatsApp settings apply on
    /// the next restart.
    pub fn reload_config(&self) -> Result<(), ServerError> {
        let new_config = load_settings(self.env.as_deref())
            .map_err(|e| ServerError::Config(format!("Failed to reload config: {}", e)))?;

        self.desk.update_automation(new_config.automation.clone());
        self.desk.update_points(new_config.points.clone());

        let roster = new_config.roster();
        let known: Vec<u64> = roster.iter().map(|a| a.id).collect();
        for advisor in roster {
            self.advisors.upsert(advisor);
        }
        // Advisors dropped from the file stop receiving leads
        for advisor in self.advisors.all() {
            if !known.contains(&advisor.id) {
                self.advisors.set_available(advisor.id, false);
            }
        }

        let mut config = self.config.write();
        if config.sla.response_window_secs != new_config.sla.response_window_secs
            || config.sla.abandonment_secs != new_config.sla.abandonment_secs
        {
            tracing::warn!("SLA windows changed; they take effect after restart");
        }
        *config = new_config;

        tracing::info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::{ManualClock, TracingAlerter};
    use leadflow_persistence::SimulatedMessageSender;

    #[test]
    fn test_in_memory_seeds_roster() {
        let mut settings = Settings::default();
        settings.advisors = vec![leadflow_config::AdvisorEntry {
            id: 4,
            name: "Marta".into(),
            phone: "5215500000004".into(),
            available: true,
        }];

        let state = AppState::in_memory(
            settings,
            Arc::new(SimulatedMessageSender::new()),
            Arc::new(TracingAlerter),
            Arc::new(ManualClock::default()),
        );
        assert_eq!(state.advisors.all().len(), 1);
        assert!(state.metrics.is_none());
    }
}
