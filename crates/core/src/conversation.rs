//! Qualification conversation state
//!
//! Exists only while a phone number is mid-qualification. The script is a
//! snapshot taken when the conversation starts, so later configuration edits
//! never change the questions an in-flight prospect sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lead::QualificationAnswer;

/// Frozen copy of the automation script for one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationScript {
    pub questions: Vec<String>,
    pub completion_message: String,
}

/// Per-phone qualification progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub phone: String,
    pub current_step_index: usize,
    pub history: Vec<QualificationAnswer>,
    pub started_at: DateTime<Utc>,
    pub script: ConversationScript,
    /// Profile name reported by the messaging channel, if any
    pub sender_name: Option<String>,
}

impl ConversationState {
    pub fn new(
        phone: impl Into<String>,
        script: ConversationScript,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            phone: phone.into(),
            current_step_index: 0,
            history: Vec::new(),
            started_at,
            script,
            sender_name: None,
        }
    }

    /// Question the prospect is currently answering
    pub fn current_question(&self) -> Option<&str> {
        self.script
            .questions
            .get(self.current_step_index)
            .map(String::as_str)
    }

    /// Record an answer to the current question and advance one step.
    ///
    /// Answers are never validated; empty text is a valid answer.
    pub fn record_answer(&mut self, answer: &str) {
        if let Some(question) = self.current_question().map(str::to_string) {
            self.history.push(QualificationAnswer::new(question, answer));
        }
        self.current_step_index += 1;
    }

    /// All questions answered
    pub fn is_complete(&self) -> bool {
        self.current_step_index >= self.script.questions.len()
    }
}

/// Value with a store-assigned version for compare-and-set writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> ConversationScript {
        ConversationScript {
            questions: vec!["Q1".into(), "Q2".into()],
            completion_message: "Gracias".into(),
        }
    }

    #[test]
    fn test_record_answers_until_complete() {
        let mut state = ConversationState::new("+521", script(), Utc::now());
        assert_eq!(state.current_question(), Some("Q1"));

        state.record_answer("Busco depto");
        assert_eq!(state.current_question(), Some("Q2"));
        assert!(!state.is_complete());

        state.record_answer("   ");
        assert!(state.is_complete());
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[1], QualificationAnswer::new("Q2", "   "));
    }
}
