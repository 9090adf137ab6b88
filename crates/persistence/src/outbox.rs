//! Simulated outbound messaging
//!
//! Messages are NOT delivered anywhere. They are kept in an outbox for audit
//! and for tests to assert on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use leadflow_core::{Error, MessageSender};

/// One recorded outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SimulatedMessageSender {
    outbox: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl SimulatedMessageSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail, to exercise delivery error paths
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.outbox.lock().clone()
    }

    /// Messages sent to one phone, oldest first
    pub fn sent_to(&self, phone: &str) -> Vec<String> {
        self.outbox
            .lock()
            .iter()
            .filter(|m| m.to == phone)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.outbox.lock().clear();
    }
}

#[async_trait]
impl MessageSender for SimulatedMessageSender {
    async fn send_message(&self, to_phone: &str, text: &str) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Send(format!("simulated failure sending to {}", to_phone)));
        }

        self.outbox.lock().push(OutboundMessage {
            to: to_phone.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
        });

        tracing::debug!(to = %to_phone, message = %text, "Message simulated");
        Ok(())
    }
}
