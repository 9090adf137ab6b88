//! Inbound message events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One received message, delivered at-least-once by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub from_phone: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Transport message id, when the channel provides one
    #[serde(default)]
    pub message_id: Option<String>,
    /// Profile name reported by the channel
    #[serde(default)]
    pub sender_name: Option<String>,
}

impl InboundEvent {
    pub fn new(from_phone: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            from_phone: from_phone.into(),
            text: text.into(),
            timestamp,
            message_id: None,
            sender_name: None,
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Key used to absorb duplicate deliveries of the same message
    pub fn idempotency_key(&self) -> String {
        match &self.message_id {
            Some(id) => format!("msg:{}", id),
            None => format!(
                "evt:{}:{}:{}",
                self.from_phone,
                self.timestamp.timestamp_millis(),
                self.text
            ),
        }
    }
}
