//! External collaborators: messaging, advisor roster, operational alerting

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assignment::{Advisor, AdvisorId};
use crate::error::{Error, StoreError};

/// Outbound message channel (WhatsApp in production).
///
/// Delivery retries are the implementation's job, not the engine's.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, to_phone: &str, text: &str) -> Result<(), Error>;
}

/// Advisor roster and availability
#[async_trait]
pub trait AdvisorDirectory: Send + Sync {
    async fn get(&self, id: AdvisorId) -> Result<Option<Advisor>, StoreError>;

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Advisor>, StoreError>;

    /// Every advisor, available or not
    async fn list(&self) -> Result<Vec<Advisor>, StoreError>;

    async fn list_available(&self) -> Result<Vec<Advisor>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Operational alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub source: String,
    pub message: String,
}

impl Alert {
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Warning,
            source: source.into(),
            message: message.into(),
        }
    }

    pub fn critical(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Critical,
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Operational alerting sink
pub trait OpsAlerter: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Alerter that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerter;

impl OpsAlerter for TracingAlerter {
    fn alert(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Warning => {
                tracing::warn!(source = %alert.source, "Operational alert: {}", alert.message)
            },
            AlertSeverity::Critical => {
                tracing::error!(source = %alert.source, "Operational alert: {}", alert.message)
            },
        }
    }
}
