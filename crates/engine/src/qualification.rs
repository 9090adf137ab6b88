//! Qualification automation
//!
//! Drives the scripted Q&A for phones that have no lead yet:
//!
//! ```text
//! NotStarted -> InProgress(step i) -> Completed
//!                     \-> Abandoned (store TTL)
//! ```
//!
//! The conversation store is written with compare-and-set. A conflict is
//! retried once from a fresh read; a second conflict is an invariant violation
//! and surfaces as [`Error::StateConflict`].

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use leadflow_config::{AutomationConfig, QualificationConfig};
use leadflow_core::{
    ConversationState, ConversationStore, Error, QualificationAnswer, Result, Versioned,
};

/// Output of a completed script, consumed by the lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadQualified {
    pub phone: String,
    /// Profile name, or a placeholder derived from the phone
    pub name: String,
    pub answers: Vec<QualificationAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualificationStep {
    /// Automation disabled and nothing in flight for this phone
    Ignored,
    /// Conversation created: welcome plus the first question
    Started { replies: Vec<String> },
    /// Answer recorded, next question sent
    Advanced { replies: Vec<String>, step: usize },
    /// Script finished. The conversation stays stored until the caller has
    /// persisted the lead and calls [`QualificationEngine::complete`].
    Completed {
        replies: Vec<String>,
        qualified: LeadQualified,
    },
}

impl QualificationStep {
    /// Messages to send back to the prospect, in order
    pub fn replies(&self) -> &[String] {
        match self {
            Self::Ignored => &[],
            Self::Started { replies }
            | Self::Advanced { replies, .. }
            | Self::Completed { replies, .. } => replies,
        }
    }
}

pub struct QualificationEngine {
    store: Arc<dyn ConversationStore>,
    automation: RwLock<AutomationConfig>,
    settings: QualificationConfig,
}

impl QualificationEngine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        automation: AutomationConfig,
        settings: QualificationConfig,
    ) -> Self {
        Self {
            store,
            automation: RwLock::new(automation),
            settings,
        }
    }

    pub fn automation(&self) -> AutomationConfig {
        self.automation.read().clone()
    }

    /// Replace the script. Conversations already running keep their snapshot.
    pub fn update_automation(&self, automation: AutomationConfig) {
        tracing::info!(
            is_active = automation.is_active,
            questions = automation.questions.len(),
            "Automation config reloaded"
        );
        *self.automation.write() = automation;
    }

    pub async fn has_conversation(&self, phone: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.store.get(phone, now).await?.is_some())
    }

    /// Feed one inbound message from a prospect into the script.
    ///
    /// Callers must hold the phone lock.
    pub async fn handle_message(
        &self,
        phone: &str,
        text: &str,
        sender_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QualificationStep> {
        match self.try_advance(phone, text, sender_name, now).await {
            Err(Error::Store(err)) if err.is_conflict() => {
                tracing::warn!(phone = %phone, error = %err, "Conversation write conflict, retrying");
            },
            other => return other,
        }

        match self.try_advance(phone, text, sender_name, now).await {
            Err(Error::Store(err)) if err.is_conflict() => {
                tracing::error!(phone = %phone, error = %err, "Conversation write conflict persisted after retry");
                Err(Error::StateConflict {
                    key: phone.to_string(),
                })
            },
            other => other,
        }
    }

    async fn try_advance(
        &self,
        phone: &str,
        text: &str,
        sender_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QualificationStep> {
        let expires_at = now + self.settings.conversation_ttl();

        let Some(Versioned { value: mut state, version }) = self.store.get(phone, now).await? else {
            return self.start(phone, sender_name, now, expires_at).await;
        };

        state.record_answer(text);

        if state.is_complete() {
            tracing::info!(
                phone = %phone,
                answers = state.history.len(),
                "Qualification completed"
            );
            return Ok(QualificationStep::Completed {
                replies: vec![state.script.completion_message.clone()],
                qualified: self.qualified(state),
            });
        }

        let step = state.current_step_index;
        let question = state.current_question().unwrap_or_default().to_string();
        self.store.put(&state, Some(version), now, expires_at).await?;

        tracing::debug!(phone = %phone, step, "Qualification advanced");
        Ok(QualificationStep::Advanced {
            replies: vec![question],
            step,
        })
    }

    async fn start(
        &self,
        phone: &str,
        sender_name: Option<&str>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<QualificationStep> {
        let automation = self.automation();
        if !automation.is_active {
            tracing::debug!(phone = %phone, "Automation inactive, message ignored");
            return Ok(QualificationStep::Ignored);
        }

        let mut state = ConversationState::new(phone, automation.snapshot(), now);
        state.sender_name = sender_name.map(str::to_string);

        let mut replies = vec![automation.welcome_message.clone()];

        let Some(question) = state.current_question().map(str::to_string) else {
            // Empty script: qualified on first contact
            replies.push(state.script.completion_message.clone());
            tracing::info!(phone = %phone, "Qualification completed with empty script");
            return Ok(QualificationStep::Completed {
                replies,
                qualified: self.qualified(state),
            });
        };

        replies.push(question);
        self.store.put(&state, None, now, expires_at).await?;

        tracing::info!(
            phone = %phone,
            questions = state.script.questions.len(),
            "Qualification started"
        );
        Ok(QualificationStep::Started { replies })
    }

    /// Clear a finished conversation once its lead is stored
    pub async fn complete(&self, phone: &str) -> Result<()> {
        self.store.delete(phone).await?;
        Ok(())
    }

    /// Drop this phone's conversation if its TTL elapsed and the sweep has
    /// not collected it yet. Returns whether one was dropped.
    pub async fn expire_stale(&self, phone: &str, now: DateTime<Utc>) -> Result<bool> {
        let expired = self.store.expire(phone, now).await?;
        if expired {
            tracing::info!(phone = %phone, "Conversation abandoned after timeout");
        }
        Ok(expired)
    }

    /// Explicit reset. Returns whether a conversation existed.
    pub async fn reset(&self, phone: &str) -> Result<bool> {
        let removed = self.store.delete(phone).await?;
        if removed {
            tracing::info!(phone = %phone, "Conversation reset");
        }
        Ok(removed)
    }

    /// Drop conversations whose TTL elapsed, returning their phones
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let phones = self.store.purge_expired(now).await?;
        for phone in &phones {
            tracing::info!(phone = %phone, "Conversation abandoned after timeout");
        }
        Ok(phones)
    }

    fn qualified(&self, state: ConversationState) -> LeadQualified {
        let name = match state.sender_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => placeholder_name(&self.settings.placeholder_name_prefix, &state.phone),
        };
        LeadQualified {
            phone: state.phone,
            name,
            answers: state.history,
        }
    }
}

/// `"{prefix} {last four digits}"`
fn placeholder_name(prefix: &str, phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("{} {}", prefix, tail)
}
